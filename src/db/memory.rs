//! In-process credential store for tests and single-node development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::CredentialStore;
use crate::auth::AuthAppService;
use crate::error::{AppError, AppResult};
use crate::models::{normalize_email, NewUser, Role, User};

#[derive(Default)]
struct Table {
    users: Vec<User>,
    by_email: HashMap<String, usize>,
    by_username: HashMap<String, usize>,
}

/// Uniqueness is checked and the row inserted under one write guard.
#[derive(Default)]
pub struct MemoryCredentialStore {
    table: RwLock<Table>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create(&self, new: NewUser<'_>) -> AppResult<User> {
        let email = normalize_email(new.email);
        // Hash before taking the lock; argon2 is slow.
        let password_hash = AuthAppService::hash_password(new.password)?;

        let mut table = self.table.write().await;
        if table.by_username.contains_key(new.username) {
            return Err(AppError::Duplicate { field: "username" });
        }
        if table.by_email.contains_key(&email) {
            return Err(AppError::Duplicate { field: "email" });
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new.username.to_string(),
            email: email.clone(),
            password_hash,
            role: new.role,
            created_at: Utc::now(),
        };
        let idx = table.users.len();
        table.by_email.insert(email, idx);
        table.by_username.insert(user.username.clone(), idx);
        table.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<User> {
        let table = self.table.read().await;
        table
            .by_email
            .get(&normalize_email(email))
            .map(|&idx| table.users[idx].clone())
            .ok_or_else(|| AppError::NotFound("user".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<User> {
        let table = self.table.read().await;
        table
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("user".to_string()))
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        Ok(self.table.read().await.users.clone())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> AppResult<User> {
        let mut table = self.table.write().await;
        let user = table
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound("user".to_string()))?;
        user.role = role;
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_user<'a>(username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            username,
            email,
            password: "right",
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn create_then_find() {
        let store = MemoryCredentialStore::new();
        let user = store.create(new_user("u", "A@x.com")).await.unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "right");

        let found = store.find_by_email("a@X.com").await.unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(store.find_by_id(user.id).await.unwrap().username, "u");
    }

    #[tokio::test]
    async fn duplicates_name_the_field() {
        let store = MemoryCredentialStore::new();
        store.create(new_user("u", "a@x.com")).await.unwrap();

        let err = store.create(new_user("u", "b@x.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate { field: "username" }));
        let err = store.create(new_user("v", "a@x.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate { field: "email" }));
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let store = MemoryCredentialStore::new();
        assert!(matches!(
            store.find_by_email("nobody@x.com").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.set_role(Uuid::new_v4(), Role::Admin).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn verify_password_checks_hash() {
        let store = MemoryCredentialStore::new();
        let user = store.create(new_user("u", "a@x.com")).await.unwrap();
        assert!(store.verify_password(&user, "right").unwrap());
        assert!(!store.verify_password(&user, "wrong").unwrap());
    }

    #[tokio::test]
    async fn set_role_is_visible_to_lookups() {
        let store = MemoryCredentialStore::new();
        let user = store.create(new_user("u", "a@x.com")).await.unwrap();
        store.set_role(user.id, Role::Moderator).await.unwrap();
        assert_eq!(store.find_by_id(user.id).await.unwrap().role, Role::Moderator);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_email_has_one_winner() {
        let store = Arc::new(MemoryCredentialStore::new());
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let username = format!("user{i}");
                    store.create(new_user(&username, "race@x.com")).await
                })
            })
            .collect();

        let mut wins = 0;
        let mut dups = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => wins += 1,
                Err(AppError::Duplicate { field: "email" }) => dups += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((wins, dups), (1, 7));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
