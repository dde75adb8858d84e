//! The credential store interface shared by the account service and the
//! refresh path of the token service.

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::AuthAppService;
use crate::error::AppResult;
use crate::models::{NewUser, Role, User};

/// User records keyed by id, unique on username and email.
///
/// `create` must make the uniqueness check and the insert one atomic step:
/// two concurrent creates with the same email yield exactly one `Ok` and one
/// `AppError::Duplicate`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Hash `new.password` and insert. Fails with `Duplicate { field }`.
    async fn create(&self, new: NewUser<'_>) -> AppResult<User>;

    /// Fails with `NotFound`.
    async fn find_by_email(&self, email: &str) -> AppResult<User>;

    /// Fails with `NotFound`.
    async fn find_by_id(&self, id: Uuid) -> AppResult<User>;

    /// All users, oldest first.
    async fn list(&self) -> AppResult<Vec<User>>;

    /// Administrative role change. Fails with `NotFound`.
    async fn set_role(&self, id: Uuid, role: Role) -> AppResult<User>;

    fn verify_password(&self, user: &User, plaintext: &str) -> AppResult<bool> {
        AuthAppService::verify_password(plaintext, &user.password_hash)
    }
}
