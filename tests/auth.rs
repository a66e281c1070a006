mod common;

use axum::http::{header, Method, Request, StatusCode};
use axum::body::Body;
use common::{read, string, TestApp};
use serde_json::json;
use treasures::{auth::PasswordPolicy, config::Config};

#[tokio::test]
async fn signup_returns_identity_and_tokens() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (status, body) = app
        .call(Method::POST, "/signup", None, Some(json!({ "email": "dig@Example.com", "password": "pw", "handle": " digger " })))
        .await?;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "dig@example.com");
    assert_eq!(body["handle"], "digger");
    assert!(body["access"].is_string());
    assert!(body["refresh"].is_string());
    assert!(body.get("password").is_none());
    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_rejected_without_creating() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    app.signup("dup@example.com", None).await?;
    let before = app.user_count().await?;

    let (status, body) = app
        .call(Method::POST, "/signup", None, Some(json!({ "email": "dup@example.com", "password": "pw" })))
        .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["email"].is_array());
    assert_eq!(app.user_count().await?, before);
    Ok(())
}

#[tokio::test]
async fn handles_are_unique_unless_absent() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    app.signup("one@example.com", Some("digger")).await?;

    let (status, body) = app
        .call(Method::POST, "/signup", None, Some(json!({ "email": "two@example.com", "password": "pw", "handle": "digger" })))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["handle"].is_array());

    app.signup("three@example.com", None).await?;
    app.signup("four@example.com", None).await?;
    let (status, _) = app
        .call(Method::POST, "/signup", None, Some(json!({ "email": "five@example.com", "password": "pw", "handle": "  " })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn signup_reports_every_missing_field() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (status, body) = app.call(Method::POST, "/signup", None, Some(json!({}))).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["email"].is_array());
    assert!(body["password"].is_array());
    Ok(())
}

#[tokio::test]
async fn strict_policy_reports_weak_passwords_with_other_errors() -> anyhow::Result<()> {
    let app = TestApp::with_config(Config { password_policy: PasswordPolicy::Strict, ..Config::relaxed() }).await?;
    app.signup("taken@example.com", None).await?;
    let before = app.user_count().await?;

    let (status, body) = app
        .call(
            Method::POST,
            "/signup",
            None,
            Some(json!({ "email": "taken@example.com", "password": "123", "handle": "h".repeat(31) })),
        )
        .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["email"].is_array());
    assert!(body["handle"].is_array());
    let password = body["password"].as_array().map(Vec::len).unwrap_or_default();
    assert!(password >= 2, "expected every password violation: {body}");
    assert_eq!(app.user_count().await?, before);
    Ok(())
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    let (status, body) = read(app.send(request).await?).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["non_field_errors"].is_array());
    Ok(())
}

#[tokio::test]
async fn login_failures_look_the_same() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    app.signup("dig@example.com", None).await?;

    let (wrong_status, wrong_body) = app
        .call(Method::POST, "/login", None, Some(json!({ "email": "dig@example.com", "password": "nope" })))
        .await?;
    let (unknown_status, unknown_body) = app
        .call(Method::POST, "/login", None, Some(json!({ "email": "nobody@example.com", "password": "nope" })))
        .await?;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, json!({ "detail": "invalid credentials" }));
    assert_eq!(wrong_body, unknown_body);

    let (status, body) = app.call(Method::POST, "/login", None, Some(json!({ "email": "dig@example.com" }))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["password"].is_array());
    Ok(())
}

#[tokio::test]
async fn login_opens_a_session() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let user = app.signup("dig@example.com", Some("digger")).await?;

    let response = app
        .send(TestApp::request(
            Method::POST,
            "/login",
            None,
            Some(&json!({ "email": "dig@example.com", "password": "correct horse battery" })),
        )?)
        .await?;
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::to_owned)
        .ok_or_else(|| anyhow::anyhow!("login did not set a cookie"))?;
    let (status, body) = read(response).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(string(&body["id"])?, user.id.to_string());

    let me = || {
        Request::builder()
            .uri("/users/me")
            .header(header::COOKIE, cookie.clone())
            .body(Body::empty())
    };
    let (status, body) = read(app.send(me()?).await?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["handle"], "digger");
    assert!(body["last_login"].is_string());

    // a bad bearer header wins over a good session
    let mut bad = me()?;
    bad.headers_mut().insert(header::AUTHORIZATION, "Bearer garbage".parse()?);
    let (status, body) = read(app.send(bad).await?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "token_not_valid");

    let logout = Request::builder()
        .method(Method::POST)
        .uri("/logout")
        .header(header::COOKIE, cookie.clone())
        .body(Body::empty())?;
    assert_eq!(app.send(logout).await?.status(), StatusCode::NO_CONTENT);

    let (status, _) = read(app.send(me()?).await?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn refresh_mints_access_tokens() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let user = app.signup("dig@example.com", None).await?;

    let (status, body) = app
        .call(Method::POST, "/token/refresh", None, Some(json!({ "refresh": user.refresh })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    let access = string(&body["access"])?;

    let (status, body) = app.call(Method::GET, "/users/me", Some(&access), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "dig@example.com");

    // token types are not interchangeable
    let (status, _) = app
        .call(Method::POST, "/token/refresh", None, Some(json!({ "refresh": user.access })))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.call(Method::GET, "/users/me", Some(&user.refresh), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn tokens_of_deleted_users_stop_working() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let user = app.signup("gone@example.com", None).await?;
    let admin = app.signup("admin@example.com", None).await?;
    app.make_staff(&admin).await?;

    let (status, _) = app
        .call(Method::DELETE, &format!("/users/{}", user.id), Some(&admin.access), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, response) = app.get("/users/me", &user).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["code"], "token_not_valid");
    Ok(())
}

#[tokio::test]
async fn missing_credentials_are_unauthorized() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let response = app.send(TestApp::request(Method::GET, "/users/me", None, None)?).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    Ok(())
}

#[tokio::test]
async fn help_and_health_are_open() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    for uri in ["/signup", "/login"] {
        let (status, body) = app.call(Method::GET, uri, None, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());
    }
    let (status, body) = app.call(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    Ok(())
}
