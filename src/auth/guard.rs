//! Role-gated access decisions over verified access tokens.

use tracing::debug;

use super::jwt::{Claims, TokenService};
use crate::error::{AppError, AppResult, TokenError};
use crate::models::Role;

/// The set of roles an endpoint accepts.
pub trait RolePolicy: Send + Sync + 'static {
    const ROLES: &'static [Role];
}

/// `GET /users`.
pub struct AdminOnly;

impl RolePolicy for AdminOnly {
    const ROLES: &'static [Role] = &[Role::Admin];
}

/// `GET /protected`.
pub struct StaffOnly;

impl RolePolicy for StaffOnly {
    const ROLES: &'static [Role] = &[Role::Admin, Role::Moderator];
}

#[derive(Clone)]
pub struct AccessGuard {
    tokens: TokenService,
}

impl AccessGuard {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }

    /// `Unauthenticated` when the token is absent or fails verification,
    /// `Forbidden` when it verifies but its role is not in `required`.
    pub fn authorize(&self, token: Option<&str>, required: &[Role]) -> AppResult<Claims> {
        let token = token.ok_or(TokenError::Missing)?;
        let claims = self.tokens.verify(token)?;
        if !required.contains(&claims.role) {
            debug!(sub = %claims.sub, role = %claims.role, "role not permitted");
            return Err(AppError::Forbidden);
        }
        Ok(claims)
    }
}
