use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{users, ApiJson, AppError, AppResult, AppState};

use super::{TokenIssuer, TokenType};

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshRequest {
    pub(crate) refresh: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshResponse {
    pub(crate) access: String,
}

/// Trades a refresh token for a new access token. The refresh token itself is
/// not rotated.
#[debug_handler(state = AppState)]
pub(crate) async fn refresh(
    State(db_pool): State<SqlitePool>,
    State(tokens): State<TokenIssuer>,
    ApiJson(RefreshRequest { refresh }): ApiJson<RefreshRequest>,
) -> AppResult<Json<RefreshResponse>> {
    let Some(refresh) = refresh.filter(|token| !token.is_empty()) else {
        return Err(AppError::validation("refresh", "This field is required."));
    };

    let claims = tokens.validate(&refresh, TokenType::Refresh)?;
    let principal = users::store::find_active(&db_pool, claims.sub)
        .await?
        .ok_or(AppError::InvalidCredential("subject is missing or inactive"))?;

    Ok(Json(RefreshResponse { access: tokens.issue(principal.id, TokenType::Access)? }))
}
