use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The two token classes. Each has its own signing secret, default lifetime
/// and ledger key namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

impl TokenClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenClass::Access => "access",
            TokenClass::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role attached to a subject at issuance.
///
/// Roles are flat: `Admin` does not imply `User`. `Reset` is only ever carried
/// by password-reset tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Viewer,
    Reset,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Viewer => "viewer",
            Role::Reset => "reset",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "viewer" => Ok(Role::Viewer),
            "reset" => Ok(Role::Reset),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Derives the token identifier from subject and expiry.
///
/// The same `(sub, exp)` pair always yields the same identifier, so a token
/// re-issued within the same second maps onto the same ledger key.
pub fn derive_jti(sub: &str, exp: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sub.as_bytes());
    hasher.update(b":");
    hasher.update(exp.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Claim set carried by every token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: a username for session tokens, an email for reset tokens.
    pub sub: String,
    /// Numeric user id, when the issuer knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Absent on refresh tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Absolute expiry, seconds since the Unix epoch.
    pub exp: i64,
    pub jti: String,
    /// Forward-compatible custom claims.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Claims {
    pub fn new(sub: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        let sub = sub.into();
        let exp = expires_at.timestamp();
        Self {
            jti: derive_jti(&sub, exp),
            sub,
            id: None,
            role: None,
            exp,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_id(mut self, id: Option<i64>) -> Self {
        self.id = id;
        self
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_jti_is_pure_function_of_subject_and_expiry() {
        let exp = Utc::now() + Duration::minutes(10);
        let a = Claims::new("alice", exp);
        let b = Claims::new("alice", exp).with_role(Role::Admin);
        assert_eq!(a.jti, b.jti);

        let other_subject = Claims::new("bob", exp);
        assert_ne!(a.jti, other_subject.jti);

        let other_expiry = Claims::new("alice", exp + Duration::seconds(1));
        assert_ne!(a.jti, other_expiry.jti);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("reset".parse::<Role>(), Ok(Role::Reset));
        assert!("Admin".parse::<Role>().is_err());
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_claims_serialization_shape() {
        let exp = DateTime::from_timestamp(1_900_000_000, 0).unwrap();
        let claims = Claims::new("bob", exp)
            .with_role(Role::User)
            .with_id(Some(42))
            .with_claim("tenant", serde_json::json!("acme"));

        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["sub"], "bob");
        assert_eq!(value["id"], 42);
        assert_eq!(value["role"], "user");
        assert_eq!(value["exp"], 1_900_000_000_i64);
        assert_eq!(value["tenant"], "acme");

        let back: Claims = serde_json::from_value(value).unwrap();
        assert_eq!(back, claims);
    }

    #[test]
    fn test_refresh_shaped_claims_omit_role_and_id() {
        let claims = Claims::new("bob", Utc::now());
        let value = serde_json::to_value(&claims).unwrap();
        assert!(value.get("role").is_none());
        assert!(value.get("id").is_none());
    }
}
