//! User directory: the collaborator the auth routes use to resolve subjects
//! to user records and to remember each user's last refresh token.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{NewUser, User};

pub use self::memory::InMemoryUserDirectory;
pub use self::postgres::PgUserDirectory;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>, AppError>;

    async fn list(&self) -> Result<Vec<User>, AppError>;

    /// Fails with `BadRequest` when the username or email is taken.
    async fn create(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn set_refresh_token(&self, user_id: i64, token: Option<&str>) -> Result<(), AppError>;

    async fn set_password_hash(&self, user_id: i64, hashed_password: &str) -> Result<(), AppError>;
}
