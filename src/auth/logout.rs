use axum::{debug_handler, http::StatusCode};
use tower_sessions::Session;

use crate::AppResult;

/// Ends the cookie session. Bearer tokens stay valid until they expire.
#[debug_handler]
pub(crate) async fn logout(session: Session) -> AppResult<StatusCode> {
    session.flush().await?;
    Ok(StatusCode::NO_CONTENT)
}
