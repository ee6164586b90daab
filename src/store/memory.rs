//! In-process implementation of the durable [`TtlStore`] contract.
//!
//! Keys expire against the injected [`Clock`]; expired keys are dropped lazily
//! on access and swept on every write. Lists are trimmed to their cap on push.
//! `set_reachable(false)` makes every call fail with
//! [`StoreError::Unavailable`], which is how tests exercise degraded paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{StoreError, TtlStore};
use crate::clock::{system_clock, SharedClock};

/// Values are never read back through the trait, so only the expiry of each
/// key is kept.
pub struct MemoryTtlStore {
    clock: SharedClock,
    keys: Mutex<HashMap<String, DateTime<Utc>>>,
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    reachable: AtomicBool,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            clock,
            keys: Mutex::new(HashMap::new()),
            lists: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Toggle simulated connectivity.
    pub fn set_reachable(&self, on: bool) {
        self.reachable.store(on, Ordering::SeqCst);
    }

    /// Number of live (unexpired) keys.
    pub fn live_keys(&self) -> usize {
        let now = self.clock.now();
        let keys = self.keys.lock().expect("store mutex poisoned");
        keys.values().filter(|at| **at > now).count()
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for MemoryTtlStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtlStore for MemoryTtlStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_reachable()
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check_reachable()?;
        let now = self.clock.now();
        let mut keys = self.keys.lock().expect("store mutex poisoned");
        match keys.get(key) {
            Some(at) if *at > now => Ok(true),
            Some(_) => {
                keys.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn set_ex(&self, key: &str, _value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_reachable()?;
        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut keys = self.keys.lock().expect("store mutex poisoned");
        keys.retain(|_, at| *at > now);
        keys.insert(key.to_string(), expires_at);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, _value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check_reachable()?;
        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut keys = self.keys.lock().expect("store mutex poisoned");
        keys.retain(|_, at| *at > now);
        if keys.contains_key(key) {
            return Ok(false);
        }
        keys.insert(key.to_string(), expires_at);
        Ok(true)
    }

    async fn push_bounded(&self, key: &str, value: String, cap: usize) -> Result<(), StoreError> {
        self.check_reachable()?;
        let mut lists = self.lists.lock().expect("store mutex poisoned");
        let list = lists.entry(key.to_string()).or_default();
        list.push_front(value);
        list.truncate(cap);
        Ok(())
    }

    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        self.check_reachable()?;
        let lists = self.lists.lock().expect("store mutex poisoned");
        Ok(lists
            .get(key)
            .map(|l| l.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn store() -> (MemoryTtlStore, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap());
        (MemoryTtlStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn keys_expire_after_ttl() {
        let (s, clock) = store();
        s.set_ex("k", "1", Duration::from_secs(60)).await.unwrap();
        assert!(s.exists("k").await.unwrap());
        clock.advance(chrono::Duration::seconds(61));
        assert!(!s.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn set_ex_replaces_expiry() {
        let (s, clock) = store();
        s.set_ex("k", "a", Duration::from_secs(600)).await.unwrap();
        s.set_ex("k", "b", Duration::from_secs(60)).await.unwrap();
        assert_eq!(s.live_keys(), 1);
        clock.advance(chrono::Duration::seconds(60));
        assert!(!s.exists("k").await.unwrap());
        assert_eq!(s.live_keys(), 0);
    }

    #[tokio::test]
    async fn set_nx_only_first_wins_until_expiry() {
        let (s, clock) = store();
        let ttl = Duration::from_secs(10);
        assert!(s.set_nx_ex("k", "1", ttl).await.unwrap());
        assert!(!s.set_nx_ex("k", "1", ttl).await.unwrap());
        clock.advance(chrono::Duration::seconds(11));
        assert!(s.set_nx_ex("k", "1", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_capped() {
        let (s, _) = store();
        for i in 0..5 {
            s.push_bounded("h", i.to_string(), 3).await.unwrap();
        }
        assert_eq!(s.range("h", 10).await.unwrap(), vec!["4", "3", "2"]);
        assert_eq!(s.range("h", 1).await.unwrap(), vec!["4"]);
        assert!(s.range("missing", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_store_fails_every_call() {
        let (s, _) = store();
        s.set_reachable(false);
        assert!(s.ping().await.is_err());
        assert!(matches!(
            s.exists("k").await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
