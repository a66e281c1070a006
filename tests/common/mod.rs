#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use treasures::{config::Config, db, AppState};
use uuid::Uuid;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
}

/// A signed-up principal and its bearer token.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub handle: Option<String>,
    pub access: String,
    pub refresh: String,
}

impl TestApp {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(Config::relaxed()).await
    }

    pub async fn with_config(config: Config) -> anyhow::Result<Self> {
        let db_pool = db::connect(&config).await?;
        let state = AppState::new(config, db_pool);
        Ok(Self { app: treasures::app(state.clone()), state })
    }

    pub async fn send(&self, request: Request<Body>) -> anyhow::Result<Response<Body>> {
        Ok(self.app.clone().oneshot(request).await?)
    }

    pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<&Value>) -> anyhow::Result<Request<Body>> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(body)?)
            }
            None => Body::empty(),
        };
        Ok(builder.body(body)?)
    }

    /// Sends and decodes the JSON body; an empty body reads as `null`.
    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> anyhow::Result<(StatusCode, Value)> {
        let response = self.send(Self::request(method, uri, token, body.as_ref())?).await?;
        read(response).await
    }

    pub async fn get(&self, uri: &str, user: &User) -> anyhow::Result<(StatusCode, Value)> {
        self.call(Method::GET, uri, Some(&user.access), None).await
    }

    pub async fn post(&self, uri: &str, user: &User, body: Value) -> anyhow::Result<(StatusCode, Value)> {
        self.call(Method::POST, uri, Some(&user.access), Some(body)).await
    }

    pub async fn signup(&self, email: &str, handle: Option<&str>) -> anyhow::Result<User> {
        let mut body = json!({ "email": email, "password": "correct horse battery" });
        if let Some(handle) = handle {
            body["handle"] = json!(handle);
        }
        let (status, body) = self.call(Method::POST, "/signup", None, Some(body)).await?;
        anyhow::ensure!(status == StatusCode::CREATED, "signup failed: {status} {body}");

        Ok(User {
            id: serde_json::from_value(body["id"].clone())?,
            email: email.to_owned(),
            handle: handle.map(str::to_owned),
            access: string(&body["access"])?,
            refresh: string(&body["refresh"])?,
        })
    }

    pub async fn make_staff(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET is_staff=1 WHERE id=?")
            .bind(user.id)
            .execute(&self.state.db_pool)
            .await?;
        Ok(())
    }

    /// Request from `a`, accepted by `b`.
    pub async fn befriend(&self, a: &User, b: &User) -> anyhow::Result<()> {
        let (status, request) = self.post("/friend-requests", a, json!({ "email": b.email })).await?;
        anyhow::ensure!(status == StatusCode::CREATED, "friend request failed: {status} {request}");
        let id = string(&request["id"])?;
        let (status, body) = self.post(&format!("/friend-requests/{id}/accept"), b, json!({})).await?;
        anyhow::ensure!(status == StatusCode::OK, "accept failed: {status} {body}");
        Ok(())
    }

    pub async fn create_treasure(&self, user: &User, name: &str) -> anyhow::Result<String> {
        let (status, body) = self
            .post("/treasures", user, json!({ "name": name, "category": "relic", "description": "found it" }))
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "create failed: {status} {body}");
        string(&body["id"])
    }

    pub async fn user_count(&self) -> anyhow::Result<i64> {
        Ok(treasures::users::store::count(&self.state.db_pool).await?)
    }
}

pub async fn read(response: Response<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, body))
}

pub fn string(value: &Value) -> anyhow::Result<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| anyhow::anyhow!("expected a string, got {value}"))
}
