//! Revocation ledger: a TTL key-value record of issued and revoked token ids.
//!
//! Keys are `"<class>:<jti>"`, values are `"valid"` or `"revoked"`. Entries
//! expire on their own, so nothing is ever swept.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use log::{debug, error};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::claims::TokenClass;

pub use self::memory::MemoryLedgerStore;
pub use self::redis_store::RedisLedgerStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// TTL of zero or less. A caller bug, not a client error.
    InvalidTtl(i64),
    /// The backing store could not be reached or rejected the command.
    Unavailable(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerError::InvalidTtl(ttl) => write!(f, "invalid ledger TTL: {}s", ttl),
            LedgerError::Unavailable(msg) => write!(f, "ledger unavailable: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    Valid,
    Revoked,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Valid => "valid",
            LedgerStatus::Revoked => "revoked",
        }
    }
}

impl FromStr for LedgerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(LedgerStatus::Valid),
            "revoked" => Ok(LedgerStatus::Revoked),
            other => Err(format!("unknown ledger status '{}'", other)),
        }
    }
}

/// What `is_revoked` answers when the store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Treat the token as not revoked.
    FailOpen,
    /// Treat the token as revoked.
    FailClosed,
}

impl FailurePolicy {
    fn degraded_answer(&self) -> bool {
        matches!(self, FailurePolicy::FailClosed)
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" | "fail-open" => Ok(FailurePolicy::FailOpen),
            "closed" | "fail-closed" => Ok(FailurePolicy::FailClosed),
            other => Err(format!(
                "unknown ledger failure policy '{}', expected 'open' or 'closed'",
                other
            )),
        }
    }
}

/// Key-value capability the ledger is built on. Every call is a single-key
/// operation; implementations must apply the TTL atomically with the write.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert or overwrite `key` with a TTL in seconds.
    async fn put(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), LedgerError>;

    /// Insert only if `key` is absent. Returns whether the write happened.
    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, LedgerError>;

    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError>;

    async fn exists(&self, key: &str) -> Result<bool, LedgerError>;
}

pub fn ledger_key(class: TokenClass, jti: &str) -> String {
    format!("{}:{}", class, jti)
}

fn checked_ttl(ttl_seconds: i64) -> Result<u64, LedgerError> {
    if ttl_seconds <= 0 {
        error!("Refusing ledger write with non-positive TTL {}s", ttl_seconds);
        return Err(LedgerError::InvalidTtl(ttl_seconds));
    }
    Ok(ttl_seconds as u64)
}

/// Token-aware view over a [`LedgerStore`].
#[derive(Clone)]
pub struct RevocationLedger {
    store: Arc<dyn LedgerStore>,
    policy: FailurePolicy,
}

impl RevocationLedger {
    pub fn new(store: Arc<dyn LedgerStore>, policy: FailurePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub async fn put(
        &self,
        class: TokenClass,
        jti: &str,
        ttl_seconds: i64,
        status: LedgerStatus,
    ) -> Result<(), LedgerError> {
        let ttl = checked_ttl(ttl_seconds)?;
        let key = ledger_key(class, jti);
        self.store.put(&key, status.as_str(), ttl).await?;
        debug!("Ledger {} set to {} for {}s", key, status.as_str(), ttl);
        Ok(())
    }

    /// Records an issued token. Never replaces an existing entry, so a
    /// re-issued token cannot clear an earlier revocation of the same id.
    pub async fn register_valid(
        &self,
        class: TokenClass,
        jti: &str,
        ttl_seconds: i64,
    ) -> Result<(), LedgerError> {
        let ttl = checked_ttl(ttl_seconds)?;
        let key = ledger_key(class, jti);
        let written = self
            .store
            .put_if_absent(&key, LedgerStatus::Valid.as_str(), ttl)
            .await?;
        if !written {
            debug!("Ledger {} already present, left untouched", key);
        }
        Ok(())
    }

    /// True only for an existing `revoked` entry. Store failures resolve to
    /// the configured [`FailurePolicy`] instead of an error.
    pub async fn is_revoked(&self, class: TokenClass, jti: &str) -> bool {
        let key = ledger_key(class, jti);
        match self.store.get(&key).await {
            Ok(Some(value)) => value.parse::<LedgerStatus>() == Ok(LedgerStatus::Revoked),
            Ok(None) => false,
            Err(e) => {
                let answer = self.policy.degraded_answer();
                error!(
                    "Revocation check for {} degraded ({}); answering revoked={} per {:?}",
                    key, e, answer, self.policy
                );
                answer
            }
        }
    }

    /// One read against the backing store, for health reporting.
    pub async fn ping(&self) -> Result<(), LedgerError> {
        self.store.exists("health:ping").await.map(|_| ())
    }

    /// Whether any entry (valid or revoked) is still live for the token.
    pub async fn is_registered(&self, class: TokenClass, jti: &str) -> Result<bool, LedgerError> {
        self.store.exists(&ledger_key(class, jti)).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    /// A store whose backend is permanently down.
    pub(crate) struct UnreachableStore;

    #[async_trait]
    impl LedgerStore for UnreachableStore {
        async fn put(&self, _: &str, _: &str, _: u64) -> Result<(), LedgerError> {
            Err(LedgerError::Unavailable("connection refused".into()))
        }

        async fn put_if_absent(&self, _: &str, _: &str, _: u64) -> Result<bool, LedgerError> {
            Err(LedgerError::Unavailable("connection refused".into()))
        }

        async fn get(&self, _: &str) -> Result<Option<String>, LedgerError> {
            Err(LedgerError::Unavailable("connection refused".into()))
        }

        async fn exists(&self, _: &str) -> Result<bool, LedgerError> {
            Err(LedgerError::Unavailable("connection refused".into()))
        }
    }

    fn memory_ledger() -> (RevocationLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryLedgerStore::new(clock.clone()));
        (RevocationLedger::new(store, FailurePolicy::FailClosed), clock)
    }

    #[test]
    fn test_ledger_key_format() {
        assert_eq!(ledger_key(TokenClass::Access, "abc"), "access:abc");
        assert_eq!(ledger_key(TokenClass::Refresh, "abc"), "refresh:abc");
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("open".parse(), Ok(FailurePolicy::FailOpen));
        assert_eq!("FAIL-CLOSED".parse(), Ok(FailurePolicy::FailClosed));
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }

    #[tokio::test]
    async fn test_put_rejects_non_positive_ttl() {
        let (ledger, _) = memory_ledger();
        assert_eq!(
            ledger
                .put(TokenClass::Access, "jti", 0, LedgerStatus::Revoked)
                .await,
            Err(LedgerError::InvalidTtl(0))
        );
        assert_eq!(
            ledger.register_valid(TokenClass::Access, "jti", -5).await,
            Err(LedgerError::InvalidTtl(-5))
        );
    }

    #[tokio::test]
    async fn test_revoked_entry_is_reported_until_it_expires() {
        let (ledger, clock) = memory_ledger();
        assert!(!ledger.is_revoked(TokenClass::Access, "jti").await);

        ledger
            .put(TokenClass::Access, "jti", 60, LedgerStatus::Revoked)
            .await
            .unwrap();
        assert!(ledger.is_revoked(TokenClass::Access, "jti").await);
        // Same id in the other class is a different key.
        assert!(!ledger.is_revoked(TokenClass::Refresh, "jti").await);

        clock.advance(Duration::seconds(60));
        assert!(!ledger.is_revoked(TokenClass::Access, "jti").await);
    }

    #[tokio::test]
    async fn test_valid_marker_is_not_revoked() {
        let (ledger, _) = memory_ledger();
        ledger
            .register_valid(TokenClass::Access, "jti", 60)
            .await
            .unwrap();
        assert!(ledger.is_registered(TokenClass::Access, "jti").await.unwrap());
        assert!(!ledger.is_revoked(TokenClass::Access, "jti").await);
    }

    #[tokio::test]
    async fn test_register_valid_does_not_clear_revocation() {
        let (ledger, _) = memory_ledger();
        ledger
            .put(TokenClass::Refresh, "jti", 60, LedgerStatus::Revoked)
            .await
            .unwrap();
        ledger
            .register_valid(TokenClass::Refresh, "jti", 60)
            .await
            .unwrap();
        assert!(ledger.is_revoked(TokenClass::Refresh, "jti").await);
    }

    #[test_log::test(tokio::test)]
    async fn test_unreachable_store_follows_failure_policy() {
        let closed = RevocationLedger::new(Arc::new(UnreachableStore), FailurePolicy::FailClosed);
        assert!(closed.is_revoked(TokenClass::Access, "jti").await);

        let open = RevocationLedger::new(Arc::new(UnreachableStore), FailurePolicy::FailOpen);
        assert!(!open.is_revoked(TokenClass::Access, "jti").await);

        assert!(matches!(
            open.put(TokenClass::Access, "jti", 5, LedgerStatus::Revoked)
                .await,
            Err(LedgerError::Unavailable(_))
        ));
    }
}
