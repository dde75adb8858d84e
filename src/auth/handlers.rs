//! Auth HTTP handlers: register, login, token refresh.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::auth::service::validate_username;
use crate::auth::TokenPair;
use crate::error::AppError;
use crate::handlers::http::{AppJson, AppState};
use crate::models::User;

/// Missing and `null` string fields both read as `""`, so they fail field
/// validation (or token decoding) instead of body parsing.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    #[validate(
        length(min = 1, max = 150, message = "Ensure this field has 1 to 150 characters."),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    #[validate(length(min = 1, max = 128, message = "Ensure this field has 1 to 128 characters."))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub refresh: String,
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    AppJson(mut body): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    body.email = body.email.trim().to_string();
    body.validate()?;

    let (user, tokens) = state
        .accounts()
        .register(&body.username, &body.email, &body.password)
        .await?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user, tokens })))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let tokens = state.accounts().login(&body.email, &body.password).await?;
    Ok(Json(LoginResponse { tokens }))
}

/// POST /token/refresh
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(body): AppJson<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let tokens = state.accounts().refresh(&body.refresh).await?;
    Ok(Json(tokens))
}
