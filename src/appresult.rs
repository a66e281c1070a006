use std::collections::BTreeMap;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::access::DenyReason;

pub type AppResult<T> = Result<T, AppError>;

/// Per-field validation messages, collected before anything touches storage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, reason: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, reason);
        errors
    }

    pub fn add(&mut self, field: &str, reason: impl Into<String>) {
        self.0.entry(field.to_owned()).or_default().push(reason.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was collected, otherwise the whole map as one error.
    pub fn check(self) -> AppResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication credentials were not provided")]
    MissingCredential,

    #[error("invalid credential: {0}")]
    InvalidCredential(&'static str),

    #[error("invalid credentials")]
    AuthenticationFailed,

    #[error("forbidden: {0:?}")]
    Forbidden(DenyReason),

    #[error("not found")]
    NotFound,

    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),

    #[error("conflict on {field}: {reason}")]
    Conflict { field: &'static str, reason: String },

    #[error("method not allowed: {0}")]
    MethodNotAllowed(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        use AppError::*;
        match self {
            MissingCredential | InvalidCredential(_) | AuthenticationFailed => StatusCode::UNAUTHORIZED,
            Forbidden(_) => StatusCode::FORBIDDEN,
            NotFound => StatusCode::NOT_FOUND,
            Validation(_) => StatusCode::BAD_REQUEST,
            Conflict { .. } => StatusCode::CONFLICT,
            MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, reason))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::MissingCredential => json!({ "detail": "authentication credentials were not provided" }),
            AppError::InvalidCredential(reason) => {
                tracing::debug!(reason, "rejected credential");
                json!({ "detail": "given token not valid", "code": "token_not_valid" })
            }
            AppError::AuthenticationFailed => json!({ "detail": "invalid credentials" }),
            AppError::Forbidden(reason) => {
                tracing::debug!(?reason, "permission denied");
                json!({ "detail": "you do not have permission to perform this action" })
            }
            AppError::NotFound => json!({ "detail": "not found" }),
            AppError::Validation(errors) => json!(errors),
            AppError::Conflict { field, reason } => json!(FieldErrors::single(field, reason)),
            AppError::MethodNotAllowed(detail) => json!({ "detail": detail }),
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "unhandled error");
                json!({ "detail": "internal server error" })
            }
        };

        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer realm=\"api\"")], Json(body)).into_response()
        } else {
            (status, Json(body)).into_response()
        }
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(serde_json::Error);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation("non_field_errors", rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation("non_field_errors", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        Self::NotFound
    }
}

/// `axum::Json` whose rejection is a field-map validation error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Path` where an unparsable id reads as a missing object.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Name of the column behind a SQLite `UNIQUE constraint failed: table.column` error.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    let db_err = err.as_database_error()?;
    if !db_err.is_unique_violation() {
        return None;
    }
    let message = db_err.message();
    let column = message.rsplit('.').next()?;
    Some(column.trim().to_owned())
}
