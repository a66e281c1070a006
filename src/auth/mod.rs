//! Credential issuing and principal resolution.

use std::sync::LazyLock;

use axum::{routing::{get, post}, Router};
use regex::Regex;
use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{appresult::unique_violation, db::Principal, users, AppError, AppResult, AppState};

mod login;
mod logout;
mod password;
mod refresh;
mod resolver;
mod signup;
mod tokens;

pub use password::{verify as verify_password, PasswordPolicy};
pub use resolver::{resolve, Authenticated, Identity};
pub use signup::{signup, SignupRequest};
pub use login::login;
pub use tokens::{Claims, TokenIssuer, TokenPair, TokenType};

pub const HANDLE_MAX_CHARS: usize = 30;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("email pattern compiles"));

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", get(signup::signup_help).post(signup::signup_handler))
        .route("/login", get(login::login_help).post(login::login_handler))
        .route("/logout", post(logout::logout))
        .route("/token/refresh", post(refresh::refresh))
}

/// What signup and login hand back.
#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub id: Uuid,
    pub email: String,
    pub handle: Option<String>,
    pub access: String,
    pub refresh: String,
}

impl IdentityResponse {
    pub fn new(principal: &Principal, tokens: TokenPair) -> Self {
        Self {
            id: principal.id,
            email: principal.email.clone(),
            handle: principal.handle.clone(),
            access: tokens.access,
            refresh: tokens.refresh,
        }
    }
}

/// Trims and lower-cases the domain part. `None` if it does not look like an address.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim();
    if !EMAIL_RE.is_match(email) {
        return None;
    }
    let (local, domain) = email.rsplit_once('@')?;
    Some(format!("{local}@{}", domain.to_lowercase()))
}

/// Blank handles are no handle at all.
pub fn normalize_handle(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|handle| !handle.is_empty()).map(str::to_owned)
}

#[derive(Debug, Clone)]
pub struct NewPrincipal<'a> {
    pub email: &'a str,
    pub handle: Option<&'a str>,
    pub password: &'a str,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Hashes the password and stores the principal. Expects already-validated
/// input; a unique violation that slipped past validation becomes `Conflict`.
pub async fn create_principal(
    db_pool: &SqlitePool,
    policy: PasswordPolicy,
    new: NewPrincipal<'_>,
) -> AppResult<Principal> {
    let principal = Principal {
        id: Uuid::now_v7(),
        email: new.email.to_owned(),
        handle: new.handle.map(str::to_owned),
        password_hash: policy.hash(new.password)?,
        is_active: true,
        is_staff: new.is_staff,
        is_superuser: new.is_superuser,
        date_joined: OffsetDateTime::now_utc(),
        last_login: None,
    };

    if let Err(err) = users::store::insert(db_pool, &principal).await {
        return Err(match unique_violation(&err).as_deref() {
            Some("email") => AppError::Conflict { field: "email", reason: "user with this email address already exists.".to_owned() },
            Some("handle") => AppError::Conflict { field: "handle", reason: "user with this handle already exists.".to_owned() },
            _ => err.into(),
        });
    }

    tracing::info!(user_id = %principal.id, staff = principal.is_staff, superuser = principal.is_superuser, "created principal");
    Ok(principal)
}
