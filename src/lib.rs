//! User registration and JWT authentication service built with Rust.
//!
//! Registers users, issues and rotates access/refresh tokens, and gates
//! endpoints by role (admin, moderator, user) with per-user throttling.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::Config;
pub use error::{AppError, TokenError};
pub use handlers::http::AppState;
pub use services::{AccountService, RateLimiter};

use std::sync::Arc;

use axum::routing::{get, post};
use db::CredentialStore;
use handlers::http;
use repositories::EphemeralStore;
use tower_http::trace::TraceLayer;

impl AppState {
    /// Wire the services over the given stores. The ephemeral store backs
    /// both spent refresh tokens and rate-limit counters.
    pub fn build(
        config: &Config,
        users: Arc<dyn CredentialStore>,
        ephemeral: Arc<dyn EphemeralStore>,
    ) -> Self {
        let tokens = auth::TokenService::new(
            &config.jwt_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
            ephemeral.clone(),
        );
        AppState {
            accounts: AccountService::new(users, tokens.clone()),
            guard: auth::AccessGuard::new(tokens),
            rate_limiter: RateLimiter::new(
                ephemeral,
                config.requests_per_window,
                config.rate_limit_window,
            ),
        }
    }
}

/// Build the API router. Used by main and by integration tests.
pub fn create_app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/token/refresh", post(auth::refresh))
        .route("/users", get(http::list_users))
        .route("/protected", get(http::protected))
        .route("/health", get(http::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
