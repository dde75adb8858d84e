//! HTTP handlers: health, user listing and the staff-only endpoint.

use axum::{
    extract::{FromRequest, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::auth::{AccessGuard, AdminOnly, StaffOnly};
use crate::error::AppError;
use crate::middleware::Authorized;
use crate::models::User;
use crate::services::{AccountService, RateLimiter};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub guard: AccessGuard,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }
    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

/// `Json` whose rejection is an `AppError`, so unreadable bodies get the
/// same JSON 400 shape as field validation failures.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// GET /users — admin only.
pub async fn list_users(
    State(state): State<AppState>,
    _auth: Authorized<AdminOnly>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.accounts().list_users().await?))
}

/// GET /protected — admin or moderator.
pub async fn protected(auth: Authorized<StaffOnly>) -> Json<serde_json::Value> {
    tracing::debug!(sub = %auth.claims.sub, role = %auth.claims.role, "protected access");
    Json(json!({ "message": "Welcome, Moderator or Admin!" }))
}

/// GET /health — liveness probe.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "rolegate" })),
    )
}
