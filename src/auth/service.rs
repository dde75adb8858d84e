//! Password hashing and credential field checks.

use crate::error::{AppError, AppResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use validator::{ValidateEmail, ValidationError};

lazy_static! {
    // Verified against when the account does not exist, so both login
    // failure paths pay for one argon2 verify.
    static ref DUMMY_HASH: Option<String> =
        AuthAppService::hash_password("rolegate-dummy-password").ok();
}

pub struct AuthAppService;

impl AuthAppService {
    /// Argon2id with a fresh random salt; returns the PHC string.
    pub fn hash_password(password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hash: {}", e)))?
            .to_string();
        Ok(hash)
    }

    pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| AppError::Internal(anyhow::anyhow!("parse hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Runs a full verify against a fixed hash and discards the result.
    pub fn verify_dummy(password: &str) {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            let _ = Self::verify_password(password, hash);
        }
    }

    pub fn validate_email(email: &str) -> AppResult<()> {
        if !email.validate_email() {
            return Err(AppError::invalid("email", "Enter a valid email address."));
        }
        Ok(())
    }
}

/// Usernames: letters, digits and `@ . + - _` only.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let ok = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if !ok {
        let mut err = ValidationError::new("username_chars");
        err.message = Some(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .into(),
        );
        return Err(err);
    }
    Ok(())
}
