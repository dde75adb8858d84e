//! Registration, login and token refresh over an injected credential store.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::auth::{AuthAppService, TokenPair, TokenService};
use crate::db::CredentialStore;
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, Role, User};

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn CredentialStore>,
    tokens: TokenService,
}

impl AccountService {
    pub fn new(users: Arc<dyn CredentialStore>, tokens: TokenService) -> Self {
        Self { users, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Store a new `user`-role account and issue its first token pair.
    /// Field shape is checked by the caller's `Validate` derive; this
    /// re-checks the invariants the store relies on.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> AppResult<(User, TokenPair)> {
        if username.trim().is_empty() {
            return Err(AppError::invalid("username", "This field may not be blank."));
        }
        if password.is_empty() {
            return Err(AppError::invalid("password", "This field may not be blank."));
        }
        AuthAppService::validate_email(email.trim())?;

        let user = self
            .users
            .create(NewUser {
                username,
                email,
                password,
                role: Role::User,
            })
            .await?;
        let tokens = self.tokens.issue(&user)?;
        info!(user_id = %user.id, "user registered");
        Ok((user, tokens))
    }

    /// Unknown email and wrong password produce the same `InvalidCredentials`.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> AppResult<TokenPair> {
        let user = match self.users.find_by_email(email).await {
            Ok(user) => user,
            Err(AppError::NotFound(_)) => {
                AuthAppService::verify_dummy(password);
                return Err(AppError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };
        if !self.users.verify_password(&user, password)? {
            return Err(AppError::InvalidCredentials);
        }
        info!(user_id = %user.id, "user logged in");
        self.tokens.issue(&user)
    }

    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        self.tokens.refresh(refresh_token, &*self.users).await
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        self.users.list().await
    }
}
