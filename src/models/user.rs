use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::auth::claims::Role;

/// A user record as held by the user directory.
///
/// `hashed_password` and `refresh_token` never leave the server.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    #[serde(skip_serializing, default)]
    pub hashed_password: String,
    /// Last refresh token issued at login; cleared on logout.
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The stored role, or `None` if the row holds something unknown.
    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

/// Fields needed to create a user; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub hashed_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> User {
        User {
            id: 1,
            username: "testuser".to_string(),
            email: "test@example.com".to_string(),
            role: "user".to_string(),
            hashed_password: "$2b$12$hash".to_string(),
            refresh_token: Some("refresh".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["username"], "testuser");
        assert_eq!(json["role"], "user");
        assert!(json.get("hashed_password").is_none());
        assert!(json.get("refresh_token").is_none());
    }

    #[test]
    fn test_role_parsing_from_record() {
        let mut user = sample();
        assert_eq!(user.role(), Some(Role::User));

        user.role = "overlord".to_string();
        assert_eq!(user.role(), None);
    }
}
