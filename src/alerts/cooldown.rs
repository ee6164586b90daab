// src/alerts/cooldown.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::SharedClock;
use crate::store::{self, BackendKind, StoreError, TtlStore, ALERT_KEY_PREFIX};

enum Backend {
    Durable(Arc<dyn TtlStore>),
    InMemory,
}

/// Per-key cooldown gate shared by every alert check.
/// - First signal for a key always passes.
/// - Inside the window the key is suppressed.
/// - [`CooldownStore::try_acquire`] checks and arms in one step.
///
/// Durable backend: `finsight:alert:{key}` with the window as expiry.
/// In-memory backend: `key -> last fired` compared against the clock; entries
/// past the window are pruned on every acquisition, so the map only holds
/// keys that are still cooling down.
pub struct CooldownStore {
    backend: Backend,
    local: Mutex<HashMap<String, DateTime<Utc>>>,
    window: Duration,
    timeout: Duration,
    clock: SharedClock,
}

impl CooldownStore {
    pub async fn connect(
        store: Option<Arc<dyn TtlStore>>,
        window: Duration,
        timeout: Duration,
        clock: SharedClock,
    ) -> Self {
        let backend = match store {
            Some(s) if store::probe(s.as_ref(), "cooldown", timeout).await => Backend::Durable(s),
            Some(_) => Backend::InMemory,
            None => {
                tracing::warn!(component = "cooldown", "no durable store configured, using in-memory cooldowns");
                Backend::InMemory
            }
        };
        Self {
            backend,
            local: Mutex::new(HashMap::new()),
            window,
            timeout,
            clock,
        }
    }

    pub fn in_memory(window: Duration, clock: SharedClock) -> Self {
        Self {
            backend: Backend::InMemory,
            local: Mutex::new(HashMap::new()),
            window,
            timeout: Duration::from_millis(500),
            clock,
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self.backend {
            Backend::Durable(_) => BackendKind::Durable,
            Backend::InMemory => BackendKind::InMemory,
        }
    }

    /// The durable store, when it passed the startup probe.
    pub fn durable(&self) -> Option<&Arc<dyn TtlStore>> {
        match &self.backend {
            Backend::Durable(s) => Some(s),
            Backend::InMemory => None,
        }
    }

    /// Atomically check and arm. Returns `true` if the caller may fire.
    pub async fn try_acquire(&self, key: &str) -> bool {
        if let Backend::Durable(s) = &self.backend {
            match store::with_deadline(
                self.timeout,
                s.set_nx_ex(&durable_key(key), "1", self.window),
            )
            .await
            {
                Ok(false) => return false,
                Ok(true) => return !self.carry_over(s.as_ref(), key).await,
                Err(e) => self.degraded("try_acquire", &e),
            }
        }
        self.local_acquire(key)
    }

    /// A key armed locally during an outage still holds after the store
    /// recovers. Its remaining window is written through and the local entry
    /// dropped. Returns `true` if such an entry was live.
    async fn carry_over(&self, s: &dyn TtlStore, key: &str) -> bool {
        let now = self.clock.now();
        let window = self.chrono_window();
        let last = {
            let mut local = self.local.lock().expect("cooldown mutex poisoned");
            local.retain(|_, last| now.signed_duration_since(*last) < window);
            match local.remove(key) {
                Some(last) => last,
                None => return false,
            }
        };
        let remaining = (window - now.signed_duration_since(last))
            .to_std()
            .unwrap_or(self.window);
        match store::with_deadline(self.timeout, s.set_ex(&durable_key(key), "1", remaining)).await {
            Ok(()) => {
                tracing::debug!(component = "cooldown", key, "outage cooldown written through");
            }
            Err(e) => {
                self.degraded("carry_over", &e);
                self.local
                    .lock()
                    .expect("cooldown mutex poisoned")
                    .insert(key.to_string(), last);
            }
        }
        true
    }

    /// Keys currently held by the in-memory map.
    pub fn tracked_keys(&self) -> usize {
        self.local.lock().expect("cooldown mutex poisoned").len()
    }

    fn local_acquire(&self, key: &str) -> bool {
        let now = self.clock.now();
        let window = self.chrono_window();
        let mut local = self.local.lock().expect("cooldown mutex poisoned");
        local.retain(|_, last| now.signed_duration_since(*last) < window);
        if local.contains_key(key) {
            return false;
        }
        local.insert(key.to_string(), now);
        true
    }

    fn chrono_window(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.window).unwrap_or(ChronoDuration::MAX)
    }

    fn degraded(&self, op: &'static str, e: &StoreError) {
        tracing::warn!(component = "cooldown", op, error = %e, "store call failed, using in-memory cooldowns");
        counter!("store_degraded_total", "component" => "cooldown").increment(1);
    }
}

fn durable_key(key: &str) -> String {
    format!("{ALERT_KEY_PREFIX}{key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryTtlStore;
    use chrono::TimeZone;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn first_passes_inside_blocked_after_passes() {
        let c = clock();
        let cd = CooldownStore::in_memory(Duration::from_secs(900), Arc::new(c.clone()));
        assert!(cd.try_acquire("price_X").await);
        c.advance(ChronoDuration::seconds(120));
        assert!(!cd.try_acquire("price_X").await);
        c.advance(ChronoDuration::seconds(779));
        assert!(!cd.try_acquire("price_X").await);
        c.advance(ChronoDuration::seconds(1));
        assert!(cd.try_acquire("price_X").await);
    }

    #[tokio::test]
    async fn expired_keys_are_pruned() {
        let c = clock();
        let cd = CooldownStore::in_memory(Duration::from_secs(60), Arc::new(c.clone()));
        for i in 0..10 {
            assert!(cd.try_acquire(&format!("k{i}")).await);
        }
        assert_eq!(cd.tracked_keys(), 10);
        c.advance(ChronoDuration::seconds(61));
        assert!(cd.try_acquire("fresh").await);
        assert_eq!(cd.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn durable_backend_uses_store_expiry() {
        let c = clock();
        let store = Arc::new(MemoryTtlStore::with_clock(Arc::new(c.clone())));
        let shared: Arc<dyn TtlStore> = store.clone();
        let cd = CooldownStore::connect(
            Some(shared),
            Duration::from_secs(900),
            Duration::from_millis(200),
            Arc::new(c.clone()),
        )
        .await;
        assert_eq!(cd.backend(), BackendKind::Durable);
        assert!(cd.try_acquire("news_Fed").await);
        assert!(store.exists("finsight:alert:news_Fed").await.unwrap());
        c.advance(ChronoDuration::minutes(14));
        assert!(!cd.try_acquire("news_Fed").await);
        c.advance(ChronoDuration::minutes(1));
        c.advance(ChronoDuration::minutes(15));
        assert!(cd.try_acquire("news_Fed").await);
        assert_eq!(cd.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn call_time_failure_degrades_to_local_map() {
        let c = clock();
        let store = Arc::new(MemoryTtlStore::with_clock(Arc::new(c.clone())));
        let shared: Arc<dyn TtlStore> = store.clone();
        let cd = CooldownStore::connect(
            Some(shared),
            Duration::from_secs(900),
            Duration::from_millis(200),
            Arc::new(c.clone()),
        )
        .await;
        store.set_reachable(false);
        assert!(cd.try_acquire("corr_A_B").await);
        assert!(!cd.try_acquire("corr_A_B").await);
        assert_eq!(cd.backend(), BackendKind::Durable);
    }

    #[tokio::test]
    async fn outage_cooldown_survives_store_recovery() {
        let c = clock();
        let store = Arc::new(MemoryTtlStore::with_clock(Arc::new(c.clone())));
        let shared: Arc<dyn TtlStore> = store.clone();
        let cd = CooldownStore::connect(
            Some(shared),
            Duration::from_secs(900),
            Duration::from_millis(200),
            Arc::new(c.clone()),
        )
        .await;
        store.set_reachable(false);
        assert!(cd.try_acquire("price_EURUSD=X").await);

        store.set_reachable(true);
        c.advance(ChronoDuration::minutes(1));
        assert!(!cd.try_acquire("price_EURUSD=X").await);
        assert_eq!(cd.tracked_keys(), 0);
        assert!(store.exists("finsight:alert:price_EURUSD=X").await.unwrap());

        // only the remainder of the original window is written through
        c.advance(ChronoDuration::minutes(13));
        assert!(!cd.try_acquire("price_EURUSD=X").await);
        c.advance(ChronoDuration::minutes(1));
        assert!(cd.try_acquire("price_EURUSD=X").await);
    }
}
