//! Request extractors applied before guarded handlers run.

pub mod auth;

pub use auth::Authorized;
