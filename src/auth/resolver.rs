use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderValue},
};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{db::Principal, session::USER_ID, users, AppError, AppResult};

use super::tokens::{TokenIssuer, TokenType};

/// Who is calling. Never fails for a caller without credentials; fails with
/// `InvalidCredential` for a caller whose bearer token does not check out.
#[derive(Debug, Clone)]
pub enum Identity {
    Authenticated(Principal),
    Anonymous,
}

/// Extractor for routes that need a caller. Anonymous requests are rejected
/// with `MissingCredential` before the handler or any scoping runs.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

fn bearer_token(header: &HeaderValue) -> AppResult<&str> {
    let value = header
        .to_str()
        .map_err(|_| AppError::InvalidCredential("malformed authorization header"))?;
    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AppError::InvalidCredential("malformed authorization header"))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::InvalidCredential("unsupported authorization scheme"));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::InvalidCredential("empty bearer token"));
    }
    Ok(token)
}

pub async fn resolve(
    parts: &Parts,
    db_pool: &SqlitePool,
    tokens: &TokenIssuer,
) -> AppResult<Identity> {
    // a bearer header, good or bad, always wins over the session
    if let Some(header) = parts.headers.get(AUTHORIZATION) {
        let claims = tokens.validate(bearer_token(header)?, TokenType::Access)?;
        let principal = users::store::find_active(db_pool, claims.sub)
            .await?
            .ok_or(AppError::InvalidCredential("subject is missing or inactive"))?;
        return Ok(Identity::Authenticated(principal));
    }

    // routers built without the session layer simply have no session
    let Some(session) = parts.extensions.get::<Session>() else {
        return Ok(Identity::Anonymous);
    };
    let Some(user_id) = session.get::<Uuid>(USER_ID).await? else {
        return Ok(Identity::Anonymous);
    };

    match users::store::find_active(db_pool, user_id).await? {
        Some(principal) => Ok(Identity::Authenticated(principal)),
        None => {
            tracing::debug!(%user_id, "dropping session of missing or inactive user");
            session.remove_value(USER_ID).await?;
            Ok(Identity::Anonymous)
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    SqlitePool: FromRef<S>,
    TokenIssuer: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let db_pool = SqlitePool::from_ref(state);
        let tokens = TokenIssuer::from_ref(state);
        resolve(parts, &db_pool, &tokens).await
    }
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
    SqlitePool: FromRef<S>,
    TokenIssuer: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Identity::from_request_parts(parts, state).await? {
            Identity::Authenticated(principal) => Ok(Authenticated(principal)),
            Identity::Anonymous => Err(AppError::MissingCredential),
        }
    }
}
