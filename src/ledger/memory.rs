use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use std::sync::Arc;

use super::{LedgerError, LedgerStore};
use crate::clock::Clock;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl MemoryEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Process-local ledger store. Expired entries are dropped when read and by
/// [`MemoryLedgerStore::purge_expired`], which [`start_cleanup_task`] runs on
/// a timer.
///
/// Suitable for tests and single-instance deployments; revocations are lost
/// on restart and are not shared between instances.
pub struct MemoryLedgerStore {
    entries: DashMap<String, MemoryEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryLedgerStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    fn entry_for(&self, value: &str, ttl_seconds: u64) -> MemoryEntry {
        MemoryEntry {
            value: value.to_string(),
            expires_at: self.clock.now() + Duration::seconds(ttl_seconds as i64),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry whose TTL has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        // Remove expired entries so the map does not grow without bound.
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        self.entries.get(key).map(|entry| entry.value.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn put(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), LedgerError> {
        let entry = self.entry_for(value, ttl_seconds);
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, LedgerError> {
        let now = self.clock.now();
        let fresh = self.entry_for(value, ttl_seconds);
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(fresh);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.live_value(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, LedgerError> {
        Ok(self.live_value(key).is_some())
    }
}

/// Sweeps expired entries from `store` every `interval_secs` seconds, forever.
pub async fn start_cleanup_task(store: Arc<MemoryLedgerStore>, interval_secs: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    info!(
        "Starting in-memory ledger cleanup task (interval: {}s)",
        interval_secs
    );

    loop {
        interval.tick().await;
        let removed = store.purge_expired();
        debug!(
            "Ledger cleanup removed {} expired entries, {} remain",
            removed,
            store.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;

    fn store() -> (MemoryLedgerStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (MemoryLedgerStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_put_get_and_expiry() {
        let (store, clock) = store();
        store.put("access:a", "revoked", 5).await.unwrap();
        assert_eq!(
            store.get("access:a").await.unwrap().as_deref(),
            Some("revoked")
        );
        assert!(store.exists("access:a").await.unwrap());

        clock.advance(Duration::seconds(4));
        assert!(store.exists("access:a").await.unwrap());

        clock.advance(Duration::seconds(1));
        assert_eq!(store.get("access:a").await.unwrap(), None);
        assert!(!store.exists("access:a").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (store, _) = store();
        store.put("k", "valid", 60).await.unwrap();
        store.put("k", "revoked", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("revoked"));
    }

    #[tokio::test]
    async fn test_put_if_absent_respects_live_entries_only() {
        let (store, clock) = store();
        assert!(store.put_if_absent("k", "valid", 10).await.unwrap());
        assert!(!store.put_if_absent("k", "other", 10).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("valid"));

        clock.advance(Duration::seconds(10));
        assert!(store.put_if_absent("k", "other", 10).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn test_purge_expired_drops_unread_entries() {
        let (store, clock) = store();
        for i in 0..1000 {
            let key = format!("access:{}", i);
            assert!(store.put_if_absent(&key, "valid", 60).await.unwrap());
        }
        store.put("refresh:long", "revoked", 86_400 * 60).await.unwrap();
        assert_eq!(store.len(), 1001);

        clock.advance(Duration::days(30));
        assert_eq!(store.purge_expired(), 1000);
        assert_eq!(store.len(), 1);
        assert!(store.exists("refresh:long").await.unwrap());

        assert_eq!(store.purge_expired(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_task_sweeps_on_first_tick() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryLedgerStore::new(clock.clone()));
        store.put("access:a", "revoked", 5).await.unwrap();
        clock.advance(Duration::seconds(10));

        // The first interval tick completes immediately.
        let task = tokio::spawn(start_cleanup_task(store.clone(), 60));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(store.is_empty());
        task.abort();
    }
}
