//! Authentication: password hashing, JWT issue/verify/rotation, role guard.

mod guard;
mod handlers;
mod jwt;
mod service;

pub use guard::{AccessGuard, AdminOnly, RolePolicy, StaffOnly};
pub use handlers::{login, refresh, register};
pub use jwt::{Claims, RefreshClaims, TokenKind, TokenPair, TokenService};
pub use service::{validate_username, AuthAppService};
