//! Postgres user queries and the `CredentialStore` built on them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

use super::{CredentialStore, DbPool};
use crate::auth::AuthAppService;
use crate::error::{AppError, AppResult};
use crate::models::{normalize_email, NewUser, Role, User};

const USER_COLUMNS: &str = "id, username, email, password_hash, role, created_at";

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("user {}: {}", row.id, e)))?;
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
        })
    }
}

/// Maps a unique-constraint violation to the field it guards.
fn duplicate_field(err: &sqlx::Error) -> Option<&'static str> {
    let db_err = err.as_database_error()?;
    if !db_err.is_unique_violation() {
        return None;
    }
    match db_err.constraint() {
        Some("users_username_key") => Some("username"),
        Some("users_email_key") => Some("email"),
        _ => None,
    }
}

pub async fn user_create(
    pool: &DbPool,
    username: &str,
    email: &str,
    password_hash: &str,
    role: Role,
) -> AppResult<UserRow> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        INSERT INTO users (username, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(role.code())
    .fetch_one(pool)
    .await
    .map_err(|e| match duplicate_field(&e) {
        Some(field) => AppError::Duplicate { field },
        None => AppError::Db(e),
    })?;
    Ok(row)
}

pub async fn user_find_by_email(pool: &DbPool, email: &str) -> AppResult<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn user_get_by_id(pool: &DbPool, id: Uuid) -> AppResult<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn users_list(pool: &DbPool) -> AppResult<Vec<UserRow>> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn user_set_role(pool: &DbPool, id: Uuid, role: Role) -> AppResult<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET role = $1 WHERE id = $2 RETURNING {USER_COLUMNS}"
    ))
    .bind(role.code())
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Postgres-backed store; uniqueness is enforced by the table's unique constraints.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: DbPool,
}

impl PgCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    #[instrument(skip(self, new), fields(username = %new.username))]
    async fn create(&self, new: NewUser<'_>) -> AppResult<User> {
        let password_hash = AuthAppService::hash_password(new.password)?;
        let email = normalize_email(new.email);
        user_create(&self.pool, new.username, &email, &password_hash, new.role)
            .await?
            .try_into()
    }

    async fn find_by_email(&self, email: &str) -> AppResult<User> {
        user_find_by_email(&self.pool, &normalize_email(email))
            .await?
            .ok_or_else(|| AppError::NotFound("user".to_string()))?
            .try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<User> {
        user_get_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("user".to_string()))?
            .try_into()
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        users_list(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn set_role(&self, id: Uuid, role: Role) -> AppResult<User> {
        user_set_role(&self.pool, id, role)
            .await?
            .ok_or_else(|| AppError::NotFound("user".to_string()))?
            .try_into()
    }
}
