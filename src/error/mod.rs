//! Application error types and their HTTP mapping.

use std::collections::BTreeMap;

use axum::{
    extract::rejection::JsonRejection,
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Per-field validation messages, rendered as `{"errors": {field: [msg, ..]}}`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Why a bearer or refresh token was not accepted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("Authentication credentials were not provided")]
    Missing,

    #[error("Token has expired")]
    Expired,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token is malformed")]
    Malformed,

    #[error("Token has already been used")]
    Revoked,

    #[error("User not found")]
    UnknownSubject,
}

impl TokenError {
    /// Machine-readable code returned next to the message. Only `token_expired`
    /// means the client should try a refresh.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Missing => "token_missing",
            TokenError::Expired => "token_expired",
            TokenError::InvalidSignature => "token_invalid_signature",
            TokenError::Malformed => "token_malformed",
            TokenError::Revoked => "token_revoked",
            TokenError::UnknownSubject => "user_not_found",
        }
    }
}

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Validation error: {0:?}")]
    Validation(FieldErrors),

    #[error("A user with this {field} already exists")]
    Duplicate { field: &'static str },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthenticated: {0}")]
    Unauthenticated(#[from] TokenError),

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("Request was throttled, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        AppError::Validation(errors)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| match &e.message {
                        Some(msg) => msg.to_string(),
                        None => format!("Invalid value ({})", e.code),
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        AppError::Validation(fields)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::invalid("non_field_errors", rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(fields) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": fields }))).into_response()
            }
            AppError::Duplicate { field } => {
                AppError::invalid(field, format!("A user with this {} already exists.", field))
                    .into_response()
            }
            AppError::InvalidCredentials => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid credentials" })),
            )
                .into_response(),
            AppError::Unauthenticated(kind) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": kind.to_string(), "code": kind.code() })),
            )
                .into_response(),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "You do not have permission to perform this action" })),
            )
                .into_response(),
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response()
            }
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({ "error": "Request was throttled" })),
            )
                .into_response(),
            AppError::Redis(e) => {
                error!(error = %e, "redis failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "Service temporarily unavailable" })),
                )
                    .into_response()
            }
            AppError::Db(e) => {
                error!(error = %e, "database failure");
                internal()
            }
            AppError::Internal(e) => {
                error!(error = %e, "internal failure");
                internal()
            }
        }
    }
}

fn internal() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_expired_tokens_suggest_refresh() {
        assert_eq!(TokenError::Expired.code(), "token_expired");
        for kind in [
            TokenError::Missing,
            TokenError::InvalidSignature,
            TokenError::Malformed,
            TokenError::Revoked,
            TokenError::UnknownSubject,
        ] {
            assert_ne!(kind.code(), "token_expired");
        }
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        let cases = [
            (AppError::invalid("email", "bad"), StatusCode::BAD_REQUEST),
            (AppError::Duplicate { field: "email" }, StatusCode::BAD_REQUEST),
            (AppError::InvalidCredentials, StatusCode::BAD_REQUEST),
            (AppError::Unauthenticated(TokenError::Expired), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (AppError::RateLimited { retry_after_secs: 3 }, StatusCode::TOO_MANY_REQUESTS),
            (AppError::NotFound("user".into()), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let res = AppError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(res.headers().get(RETRY_AFTER).unwrap(), "42");
    }
}
