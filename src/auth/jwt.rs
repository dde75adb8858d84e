//! JWT access/refresh token issue, verification and rotation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::CredentialStore;
use crate::error::{AppError, AppResult, TokenError};
use crate::models::{Role, User};
use crate::repositories::EphemeralStore;

const SPENT_REFRESH_PREFIX: &str = "refresh:spent:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Payload of a verified access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub token_type: TokenKind,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Payload of a verified refresh token. Carries no role: the role is
/// re-read from the store on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub token_type: TokenKind,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

trait Typed {
    fn kind(&self) -> TokenKind;
}

impl Typed for Claims {
    fn kind(&self) -> TokenKind {
        self.token_type
    }
}

impl Typed for RefreshClaims {
    fn kind(&self) -> TokenKind {
        self.token_type
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Stateless signer/verifier over one process-wide HS256 secret. The only
/// state it touches is the spent-refresh-token set in its `EphemeralStore`.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    spent: Arc<dyn EphemeralStore>,
}

impl TokenService {
    pub fn new(
        secret: &str,
        access_ttl: std::time::Duration,
        refresh_ttl: std::time::Duration,
        spent: Arc<dyn EphemeralStore>,
    ) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::from_std(access_ttl).unwrap_or(Duration::minutes(15)),
            refresh_ttl: Duration::from_std(refresh_ttl).unwrap_or(Duration::days(7)),
            spent,
        }
    }

    pub fn issue(&self, user: &User) -> AppResult<TokenPair> {
        self.issue_at(user, Utc::now())
    }

    pub(crate) fn issue_at(&self, user: &User, now: DateTime<Utc>) -> AppResult<TokenPair> {
        let access = Claims {
            sub: user.id,
            role: user.role,
            token_type: TokenKind::Access,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        let refresh = RefreshClaims {
            sub: user.id,
            token_type: TokenKind::Refresh,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };
        Ok(TokenPair {
            access: self.sign(&access)?,
            refresh: self.sign(&refresh)?,
        })
    }

    fn sign<C: Serialize>(&self, claims: &C) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("jwt encode: {}", e)))
    }

    /// Verify an access token.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_as(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.decode_as(token, TokenKind::Refresh)
    }

    fn decode_as<C: DeserializeOwned + Typed>(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<C, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        let data = decode::<C>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed,
        })?;
        if data.claims.kind() != kind {
            return Err(TokenError::Malformed);
        }
        Ok(data.claims)
    }

    /// Exchange a refresh token for a new pair. The presented token is spent:
    /// a second exchange of it fails with `Revoked`. The new access token
    /// carries the user's current role.
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        users: &dyn CredentialStore,
    ) -> AppResult<TokenPair> {
        let claims = self.verify_refresh(refresh_token)?;

        // A failed lookup must leave the token unspent.
        let user = match users.find_by_id(claims.sub).await {
            Ok(user) => user,
            Err(AppError::NotFound(_)) => return Err(TokenError::UnknownSubject.into()),
            Err(e) => return Err(e),
        };

        let remaining = (claims.exp - Utc::now().timestamp()).max(1) as u64;
        let key = format!("{}{}", SPENT_REFRESH_PREFIX, claims.jti);
        if !self
            .spent
            .claim(&key, std::time::Duration::from_secs(remaining))
            .await?
        {
            debug!(sub = %claims.sub, "refresh token reuse rejected");
            return Err(TokenError::Revoked.into());
        }

        debug!(sub = %user.id, role = %user.role, "refresh token rotated");
        self.issue(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryCredentialStore;
    use crate::models::NewUser;
    use crate::repositories::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    const SECRET: &str = "test-jwt-secret-min-32-chars!!!!";

    fn service(secret: &str) -> TokenService {
        TokenService::new(
            secret,
            std::time::Duration::from_secs(15 * 60),
            std::time::Duration::from_secs(7 * 24 * 3600),
            Arc::new(MemoryStore::new()),
        )
    }

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            username: "u".to_string(),
            email: "u@x.com".to_string(),
            password_hash: String::new(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn verify_round_trips_subject_and_role() {
        let tokens = service(SECRET);
        let u = user(Role::Moderator);
        let pair = tokens.issue(&u).unwrap();
        let claims = tokens.verify(&pair.access).unwrap();
        assert_eq!(claims.sub, u.id);
        assert_eq!(claims.role, Role::Moderator);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn refresh_outlives_access() {
        let tokens = service(SECRET);
        let pair = tokens.issue(&user(Role::User)).unwrap();
        let access = tokens.verify(&pair.access).unwrap();
        let refresh = tokens.verify_refresh(&pair.refresh).unwrap();
        assert!(refresh.exp > access.exp);
        assert_ne!(refresh.jti, access.jti);
    }

    #[test]
    fn expired_token_is_expired() {
        let tokens = service(SECRET);
        let issued = Utc::now() - Duration::minutes(15) - Duration::seconds(1);
        let pair = tokens.issue_at(&user(Role::User), issued).unwrap();
        assert_eq!(tokens.verify(&pair.access).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn foreign_signature_is_invalid_signature() {
        let pair = service("another-secret-that-is-32-chars-long").issue(&user(Role::Admin)).unwrap();
        assert_eq!(
            service(SECRET).verify(&pair.access).unwrap_err(),
            TokenError::InvalidSignature
        );
    }

    #[test]
    fn swapped_payload_is_invalid_signature() {
        let tokens = service(SECRET);
        let mine = tokens.issue(&user(Role::User)).unwrap().access;
        let admin = tokens.issue(&user(Role::Admin)).unwrap().access;
        let mine: Vec<&str> = mine.split('.').collect();
        let admin: Vec<&str> = admin.split('.').collect();
        let forged = format!("{}.{}.{}", mine[0], admin[1], mine[2]);
        assert_eq!(tokens.verify(&forged).unwrap_err(), TokenError::InvalidSignature);
    }

    #[test]
    fn garbage_is_malformed() {
        let tokens = service(SECRET);
        assert_eq!(tokens.verify("not-a-jwt").unwrap_err(), TokenError::Malformed);
        assert_eq!(tokens.verify("").unwrap_err(), TokenError::Malformed);
    }

    #[test]
    fn token_types_are_not_interchangeable() {
        let tokens = service(SECRET);
        let pair = tokens.issue(&user(Role::Admin)).unwrap();
        assert_eq!(tokens.verify(&pair.refresh).unwrap_err(), TokenError::Malformed);
        assert_eq!(
            tokens.verify_refresh(&pair.access).unwrap_err(),
            TokenError::Malformed
        );
    }

    async fn registered(store: &MemoryCredentialStore) -> User {
        store
            .create(NewUser {
                username: "u",
                email: "u@x.com",
                password: "pw",
                role: Role::User,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn refresh_rotates_and_picks_up_role_change() {
        let tokens = service(SECRET);
        let store = MemoryCredentialStore::new();
        let u = registered(&store).await;
        let pair = tokens.issue(&u).unwrap();

        store.set_role(u.id, Role::Admin).await.unwrap();
        let next = tokens.refresh(&pair.refresh, &store).await.unwrap();
        let claims = tokens.verify(&next.access).unwrap();
        assert_eq!(claims.sub, u.id);
        assert_eq!(claims.role, Role::Admin);
        assert_ne!(next.refresh, pair.refresh);

        // The rotated token works once; the spent one never again.
        assert!(tokens.refresh(&next.refresh, &store).await.is_ok());
        let err = tokens.refresh(&pair.refresh, &store).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(TokenError::Revoked)));
    }

    #[tokio::test]
    async fn refresh_rejects_expired_and_malformed() {
        let tokens = service(SECRET);
        let store = MemoryCredentialStore::new();
        let u = registered(&store).await;

        let old = Utc::now() - Duration::days(8);
        let stale = tokens.issue_at(&u, old).unwrap();
        let err = tokens.refresh(&stale.refresh, &store).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(TokenError::Expired)));

        let err = tokens.refresh("garbage", &store).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(TokenError::Malformed)));

        let pair = tokens.issue(&u).unwrap();
        let err = tokens.refresh(&pair.access, &store).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(TokenError::Malformed)));
    }

    /// Delegates to a memory store but can be told to fail `find_by_id`.
    struct FlakyStore {
        inner: MemoryCredentialStore,
        fail_lookups: AtomicBool,
    }

    #[async_trait]
    impl CredentialStore for FlakyStore {
        async fn create(&self, new: NewUser<'_>) -> AppResult<User> {
            self.inner.create(new).await
        }

        async fn find_by_email(&self, email: &str) -> AppResult<User> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_id(&self, id: Uuid) -> AppResult<User> {
            if self.fail_lookups.load(Ordering::SeqCst) {
                return Err(AppError::Db(sqlx::Error::PoolTimedOut));
            }
            self.inner.find_by_id(id).await
        }

        async fn list(&self) -> AppResult<Vec<User>> {
            self.inner.list().await
        }

        async fn set_role(&self, id: Uuid, role: Role) -> AppResult<User> {
            self.inner.set_role(id, role).await
        }
    }

    #[tokio::test]
    async fn failed_lookup_does_not_spend_refresh_token() {
        let tokens = service(SECRET);
        let store = FlakyStore {
            inner: MemoryCredentialStore::new(),
            fail_lookups: AtomicBool::new(true),
        };
        let u = registered(&store.inner).await;
        let pair = tokens.issue(&u).unwrap();

        let err = tokens.refresh(&pair.refresh, &store).await.unwrap_err();
        assert!(matches!(err, AppError::Db(_)));

        store.fail_lookups.store(false, Ordering::SeqCst);
        let next = tokens.refresh(&pair.refresh, &store).await.unwrap();
        assert_eq!(tokens.verify(&next.access).unwrap().sub, u.id);
    }

    #[tokio::test]
    async fn refresh_for_vanished_user_fails() {
        let tokens = service(SECRET);
        let store = MemoryCredentialStore::new();
        let pair = tokens.issue(&user(Role::User)).unwrap();
        let err = tokens.refresh(&pair.refresh, &store).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(TokenError::UnknownSubject)));
    }
}
