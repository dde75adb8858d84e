//! Auth extractor: bearer token → role guard → per-subject throttle.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::auth::{Claims, RolePolicy};
use crate::error::AppError;
use crate::handlers::http::AppState;

/// Extractor: claims of a caller whose role is in `P::ROLES` and who is
/// within the rate limit.
pub struct Authorized<P> {
    pub claims: Claims,
    _policy: PhantomData<P>,
}

#[axum::async_trait]
impl<P: RolePolicy> FromRequestParts<AppState> for Authorized<P> {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .ok();
        let token = bearer.as_ref().map(|TypedHeader(auth)| auth.token());

        let claims = state.guard().authorize(token, P::ROLES)?;
        state.rate_limiter().check(claims.sub).await?;

        Ok(Authorized {
            claims,
            _policy: PhantomData,
        })
    }
}
