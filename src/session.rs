//! Keys stored in the cookie session.

/// Id of the principal who logged in through `/login`.
pub const USER_ID: &str = "user_id";
