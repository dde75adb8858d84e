//! Credential storage: the `CredentialStore` seam plus its Postgres and
//! in-memory implementations.

mod memory;
mod pool;
mod repositories;
mod store;

pub use memory::MemoryCredentialStore;
pub use pool::{create_pool, migrate, DbPool};
pub use repositories::*;
pub use store::CredentialStore;
