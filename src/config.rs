use chrono::Duration;
use std::env;
use std::fmt;

use crate::ledger::FailurePolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Settings for token issuance and the revocation ledger.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub failure_policy: FailurePolicy,
    /// Write a `valid` ledger entry for every issued token.
    pub register_issued_tokens: bool,
}

pub struct Config {
    pub server_port: u16,
    pub server_host: String,
    /// Postgres user directory when set, in-memory otherwise.
    pub database_url: Option<String>,
    /// Redis ledger when set, in-memory otherwise.
    pub redis_url: Option<String>,
    pub auth: AuthConfig,
}

fn required(key: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError(format!("{} must be set", key))),
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError(format!("{} has an invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_secret = required("ACCESS_SECRET")?;
        let refresh_secret = required("REFRESH_SECRET")?;
        if access_secret == refresh_secret {
            return Err(ConfigError(
                "ACCESS_SECRET and REFRESH_SECRET must differ".into(),
            ));
        }

        let access_minutes: i64 = parsed("ACCESS_TOKEN_TTL_MINUTES", 10)?;
        let refresh_days: i64 = parsed("REFRESH_TOKEN_TTL_DAYS", 1)?;
        if access_minutes <= 0 || refresh_days <= 0 {
            return Err(ConfigError("token lifetimes must be positive".into()));
        }

        let failure_policy = match optional("LEDGER_FAILURE_POLICY") {
            Some(raw) => raw.parse().map_err(ConfigError)?,
            None => FailurePolicy::FailClosed,
        };

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl: Duration::minutes(access_minutes),
            refresh_ttl: Duration::days(refresh_days),
            failure_policy,
            register_issued_tokens: parsed("LEDGER_REGISTER_ISSUED", true)?,
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_port: parsed("SERVER_PORT", 8080)?,
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            auth: AuthConfig::from_env()?,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}
