use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::UserDirectory;
use crate::error::AppError;
use crate::models::{NewUser, User};

/// Directory kept in process memory. Used by tests and when no
/// `DATABASE_URL` is configured.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<Vec<User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find_where<P>(&self, predicate: P) -> Option<User>
    where
        P: Fn(&User) -> bool,
    {
        self.users.read().await.iter().find(|u| predicate(u)).cloned()
    }

    async fn update<F>(&self, user_id: i64, apply: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut User),
    {
        let mut users = self.users.write().await;
        match users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                apply(user);
                Ok(())
            }
            None => Err(AppError::NotFound("User not found".into())),
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self.find_where(|u| u.username == username).await)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.find_where(|u| u.email == email).await)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.find_where(|u| u.id == id).await)
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .find_where(|u| u.refresh_token.as_deref() == Some(token))
            .await)
    }

    async fn list(&self) -> Result<Vec<User>, AppError> {
        Ok(self.users.read().await.clone())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.username == new_user.username) {
            return Err(AppError::BadRequest("Username already exists".into()));
        }
        if users.iter().any(|u| u.email == new_user.email) {
            return Err(AppError::BadRequest("Email already registered".into()));
        }

        let user = User {
            id: users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
            username: new_user.username,
            email: new_user.email,
            role: new_user.role.as_str().to_string(),
            hashed_password: new_user.hashed_password,
            refresh_token: None,
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn set_refresh_token(&self, user_id: i64, token: Option<&str>) -> Result<(), AppError> {
        let token = token.map(str::to_string);
        self.update(user_id, |user| user.refresh_token = token).await
    }

    async fn set_password_hash(&self, user_id: i64, hashed_password: &str) -> Result<(), AppError> {
        let hashed_password = hashed_password.to_string();
        self.update(user_id, |user| user.hashed_password = hashed_password)
            .await
    }
}
