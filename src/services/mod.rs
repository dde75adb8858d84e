//! Business logic: accounts and request throttling.

pub mod accounts;
pub mod rate_limit;

pub use accounts::AccountService;
pub use rate_limit::RateLimiter;
