mod common;

use axum::http::{Method, StatusCode};
use common::{string, TestApp, User};
use serde_json::{json, Value};

async fn friend_ids(app: &TestApp, user: &User) -> anyhow::Result<Vec<String>> {
    let (status, friends) = app.get("/friends", user).await?;
    anyhow::ensure!(status == StatusCode::OK, "listing friends failed: {status}");
    friends
        .as_array()
        .into_iter()
        .flatten()
        .map(|friend| string(&friend["id"]))
        .collect()
}

async fn send(app: &TestApp, from: &User, body: Value) -> anyhow::Result<(StatusCode, Value)> {
    app.post("/friend-requests", from, body).await
}

#[tokio::test]
async fn accepting_makes_friends_both_ways() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let alice = app.signup("alice@example.com", Some("alice")).await?;
    let bob = app.signup("bob@example.com", Some("bob")).await?;

    let (status, request) = send(&app, &alice, json!({ "handle": "bob" })).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "pending");
    let id = string(&request["id"])?;

    let (_, pending) = app.get("/friend-requests", &bob).await?;
    assert_eq!(pending["received"][0]["id"], request["id"]);
    let (_, pending) = app.get("/friend-requests", &alice).await?;
    assert_eq!(pending["sent"][0]["id"], request["id"]);

    // only the receiver can see the request
    let (status, _) = app.post(&format!("/friend-requests/{id}/accept"), &alice, json!({})).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, accepted) = app.post(&format!("/friend-requests/{id}/accept"), &bob, json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["accepted"], true);
    assert_eq!(accepted["status"], "accepted");
    assert!(accepted["date_responded"].is_string());

    assert_eq!(friend_ids(&app, &alice).await?, vec![bob.id.to_string()]);
    assert_eq!(friend_ids(&app, &bob).await?, vec![alice.id.to_string()]);

    let (status, _) = app.post(&format!("/friend-requests/{id}/accept"), &bob, json!({})).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app.post(&format!("/friend-requests/{id}/reject"), &bob, json!({})).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, pending) = app.get("/friend-requests", &bob).await?;
    assert_eq!(pending, json!({ "received": [], "sent": [] }));
    Ok(())
}

#[tokio::test]
async fn rejecting_leaves_no_friendship() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let alice = app.signup("alice@example.com", None).await?;
    let bob = app.signup("bob@example.com", None).await?;

    let (_, request) = send(&app, &alice, json!({ "email": "bob@example.com" })).await?;
    let id = string(&request["id"])?;
    let (status, rejected) = app.post(&format!("/friend-requests/{id}/reject"), &bob, json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");

    assert!(friend_ids(&app, &alice).await?.is_empty());
    assert!(friend_ids(&app, &bob).await?.is_empty());

    // a rejected request does not block a new one
    let (status, _) = send(&app, &alice, json!({ "email": "bob@example.com" })).await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn bad_requests_are_refused() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let alice = app.signup("alice@example.com", Some("alice")).await?;
    let bob = app.signup("bob@example.com", Some("bob")).await?;

    let (status, _) = send(&app, &alice, json!({ "handle": "alice" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, &alice, json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, &alice, json!({ "handle": "nobody" })).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, &alice, json!({ "handle": "Unknown Author" })).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, &alice, json!({ "handle": "bob" })).await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(&app, &bob, json!({ "handle": "alice" })).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["non_field_errors"].is_array());
    let (status, _) = send(&app, &alice, json!({ "email": "bob@example.com" })).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, pending) = app.get("/friend-requests", &bob).await?;
    let id = string(&pending["received"][0]["id"])?;
    app.post(&format!("/friend-requests/{id}/accept"), &bob, json!({})).await?;

    let (status, _) = send(&app, &alice, json!({ "handle": "bob" })).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn removing_a_friend_is_symmetric() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let alice = app.signup("alice@example.com", None).await?;
    let bob = app.signup("bob@example.com", None).await?;
    app.befriend(&alice, &bob).await?;

    let (status, _) = app.call(Method::DELETE, &format!("/friends/{}", alice.id), Some(&bob.access), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(friend_ids(&app, &alice).await?.is_empty());
    assert!(friend_ids(&app, &bob).await?.is_empty());

    let (status, _) = app.call(Method::DELETE, &format!("/friends/{}", alice.id), Some(&bob.access), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
