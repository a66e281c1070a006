use std::sync::Arc;

use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::{config::Config, db::Principal, users, ApiJson, AppError, AppResult, AppState, FieldErrors};

use super::{
    create_principal, normalize_email, normalize_handle, IdentityResponse, NewPrincipal, PasswordPolicy, TokenIssuer,
    TokenPair, HANDLE_MAX_CHARS,
};

const REQUIRED: &str = "This field is required.";

/// Every field optional so that absence is reported per field, not as a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub handle: Option<String>,
}

/// Validates everything up front, then creates the principal and its tokens.
pub async fn signup(
    db_pool: &SqlitePool,
    tokens: &TokenIssuer,
    policy: PasswordPolicy,
    request: SignupRequest,
) -> AppResult<(Principal, TokenPair)> {
    let mut errors = FieldErrors::new();

    let email = match request.email.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add("email", REQUIRED);
            None
        }
        Some(raw) => match normalize_email(raw) {
            None => {
                errors.add("email", "Enter a valid email address.");
                None
            }
            Some(email) if users::store::email_taken(db_pool, &email).await? => {
                errors.add("email", "user with this email address already exists.");
                None
            }
            Some(email) => Some(email),
        },
    };

    let handle = normalize_handle(request.handle.as_deref());
    if let Some(handle) = &handle {
        if handle.chars().count() > HANDLE_MAX_CHARS {
            errors.add("handle", format!("Ensure this field has no more than {HANDLE_MAX_CHARS} characters."));
        } else if users::store::handle_taken(db_pool, handle, None).await? {
            errors.add("handle", "user with this handle already exists.");
        }
    }

    let password = request.password.unwrap_or_default();
    if password.is_empty() {
        errors.add("password", REQUIRED);
    } else {
        let email_for_similarity = email.as_deref().or(request.email.as_deref()).unwrap_or_default();
        for violation in policy.violations(&password, email_for_similarity, handle.as_deref()) {
            errors.add("password", violation);
        }
    }

    errors.check()?;
    let email = email.ok_or_else(|| AppError::validation("email", REQUIRED))?;

    let principal = create_principal(
        db_pool,
        policy,
        NewPrincipal {
            email: &email,
            handle: handle.as_deref(),
            password: &password,
            is_staff: false,
            is_superuser: false,
        },
    )
    .await?;
    let pair = tokens.issue_pair(principal.id)?;

    Ok((principal, pair))
}

#[debug_handler]
pub(crate) async fn signup_help() -> Json<Value> {
    Json(json!({
        "message": "POST email, password and optionally handle to create an account.",
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup_handler(
    State(db_pool): State<SqlitePool>,
    State(tokens): State<TokenIssuer>,
    State(config): State<Arc<Config>>,
    ApiJson(request): ApiJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<IdentityResponse>)> {
    let (principal, pair) = signup(&db_pool, &tokens, config.password_policy, request).await?;
    tracing::info!(user_id = %principal.id, "signed up");

    Ok((StatusCode::CREATED, Json(IdentityResponse::new(&principal, pair))))
}
