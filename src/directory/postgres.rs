use async_trait::async_trait;
use sqlx::PgPool;

use super::UserDirectory;
use crate::error::AppError;
use crate::models::{NewUser, User};

const USER_COLUMNS: &str =
    "id, username, email, role, hashed_password, refresh_token, created_at";

const DUPLICATE_USER_MESSAGE: &str = "Username or email already registered";

/// A concurrent registration can slip past the pre-insert check; the unique
/// constraints catch it and it is reported like any other duplicate.
fn duplicate_as_bad_request(error: sqlx::Error) -> AppError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::BadRequest(DUPLICATE_USER_MESSAGE.into())
        }
        _ => error.into(),
    }
}

/// Directory backed by the `users` table:
///
/// ```sql
/// CREATE TABLE users (
///     id              BIGSERIAL PRIMARY KEY,
///     username        TEXT NOT NULL UNIQUE,
///     email           TEXT NOT NULL UNIQUE,
///     role            TEXT NOT NULL DEFAULT 'user',
///     hashed_password TEXT NOT NULL,
///     refresh_token   TEXT,
///     created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
/// );
/// ```
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, condition: &str, value: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, condition);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.fetch_one_where("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.fetch_one_where("email", email).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>, AppError> {
        self.fetch_one_where("refresh_token", token).await
    }

    async fn list(&self) -> Result<Vec<User>, AppError> {
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let existing = sqlx::query_as::<_, (i64,)>(
            "SELECT id FROM users WHERE username = $1 OR email = $2",
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            return Err(AppError::BadRequest(DUPLICATE_USER_MESSAGE.into()));
        }

        let sql = format!(
            "INSERT INTO users (username, email, role, hashed_password) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(new_user.username)
            .bind(new_user.email)
            .bind(new_user.role.as_str())
            .bind(new_user.hashed_password)
            .fetch_one(&self.pool)
            .await
            .map_err(duplicate_as_bad_request)?;
        Ok(user)
    }

    async fn set_refresh_token(&self, user_id: i64, token: Option<&str>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET refresh_token = $1 WHERE id = $2")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".into()));
        }
        Ok(())
    }

    async fn set_password_hash(&self, user_id: i64, hashed_password: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET hashed_password = $1 WHERE id = $2")
            .bind(hashed_password)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".into()));
        }
        Ok(())
    }
}
