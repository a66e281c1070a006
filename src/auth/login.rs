use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{db::Principal, session::USER_ID, users, ApiJson, AppError, AppResult, AppState, FieldErrors};

use super::{normalize_email, verify_password, IdentityResponse, TokenIssuer, TokenPair};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LoginRequest {
    pub(crate) email: Option<String>,
    pub(crate) password: Option<String>,
}

/// Unknown email, inactive account and wrong password all fail the same way.
pub async fn login(
    db_pool: &SqlitePool,
    tokens: &TokenIssuer,
    email: &str,
    password: &str,
) -> AppResult<(Principal, TokenPair)> {
    let email = normalize_email(email).ok_or(AppError::AuthenticationFailed)?;
    let Some(mut principal) = users::store::find_by_email(db_pool, &email).await? else {
        tracing::debug!("login for unknown email");
        return Err(AppError::AuthenticationFailed);
    };
    if !principal.is_active || !verify_password(&principal.password_hash, password) {
        tracing::debug!(user_id = %principal.id, "login rejected");
        return Err(AppError::AuthenticationFailed);
    }

    principal.last_login = Some(users::store::touch_last_login(db_pool, principal.id).await?);
    let pair = tokens.issue_pair(principal.id)?;
    Ok((principal, pair))
}

#[debug_handler]
pub(crate) async fn login_help() -> Json<Value> {
    Json(json!({
        "message": "POST email and password to receive an access and a refresh token.",
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn login_handler(
    State(db_pool): State<SqlitePool>,
    State(tokens): State<TokenIssuer>,
    session: Session,
    ApiJson(LoginRequest { email, password }): ApiJson<LoginRequest>,
) -> AppResult<Json<IdentityResponse>> {
    let mut errors = FieldErrors::new();
    let email = email.filter(|email| !email.trim().is_empty());
    let password = password.filter(|password| !password.is_empty());
    if email.is_none() {
        errors.add("email", "This field is required.");
    }
    if password.is_none() {
        errors.add("password", "This field is required.");
    }
    errors.check()?;
    let (Some(email), Some(password)) = (email, password) else {
        return Err(AppError::validation("non_field_errors", "email and password are required"));
    };

    let (principal, pair) = login(&db_pool, &tokens, &email, &password).await?;

    session.cycle_id().await?;
    session.insert(USER_ID, principal.id).await?;
    tracing::info!(user_id = %principal.id, "logged in");

    Ok(Json(IdentityResponse::new(&principal, pair)))
}
