//! Content-hash deduplication with bounded retention.
//!
//! A SHA-256 over the raw UTF-8 bytes is the dedup key. On the durable
//! backend each hash lives under `finsight:dedup:{hash}` and expires after the
//! configured TTL (7 days by default), after which the same content may be
//! ingested again.
//!
//! When the durable store fails its startup probe the deduplicator runs on an
//! in-process set instead. That set has no expiry and grows without bound for
//! as long as the process stays degraded; it is best-effort and not shared
//! across processes. A durable store that fails at call time is handled the
//! same way for that call (warning logged, in-process set consulted). Hashes
//! recorded in the set during an outage still count as seen once the store is
//! back; the first claim after recovery moves them into the store.
//!
//! Race note: `is_duplicate` followed by `mark_seen` is not atomic; two
//! ingesters may both pass the check for identical content. Use [`Deduplicator::claim`]
//! where exactly-once matters: it maps to an atomic set-if-absent.

use metrics::counter;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::DedupSettings;
use crate::store::{self, BackendKind, StoreError, TtlStore, DEDUP_KEY_PREFIX};

enum Backend {
    Durable(Arc<dyn TtlStore>),
    InMemory,
}

pub struct Deduplicator {
    backend: Backend,
    fallback: Mutex<HashSet<String>>,
    ttl: Duration,
    timeout: Duration,
}

impl Deduplicator {
    /// Probe `store` once and pick the backend. `None` or a failed probe
    /// selects the in-memory set.
    pub async fn connect(store: Option<Arc<dyn TtlStore>>, settings: &DedupSettings) -> Self {
        crate::metrics::ensure_metrics_described();
        let backend = match store {
            Some(s) if store::probe(s.as_ref(), "dedup", settings.store_timeout()).await => {
                Backend::Durable(s)
            }
            Some(_) => Backend::InMemory,
            None => {
                tracing::warn!(component = "dedup", "no durable store configured, using in-memory fallback");
                Backend::InMemory
            }
        };
        Self {
            backend,
            fallback: Mutex::new(HashSet::new()),
            ttl: settings.ttl(),
            timeout: settings.store_timeout(),
        }
    }

    /// In-memory deduplicator without probing anything.
    pub fn in_memory() -> Self {
        let settings = DedupSettings::default();
        Self {
            backend: Backend::InMemory,
            fallback: Mutex::new(HashSet::new()),
            ttl: settings.ttl(),
            timeout: settings.store_timeout(),
        }
    }

    /// Lowercase hex SHA-256 of `text`.
    pub fn hash_content(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        let mut out = String::with_capacity(64);
        for b in digest.iter() {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }

    pub fn backend(&self) -> BackendKind {
        match self.backend {
            Backend::Durable(_) => BackendKind::Durable,
            Backend::InMemory => BackendKind::InMemory,
        }
    }

    /// Hashes held by the in-process set.
    pub fn fallback_len(&self) -> usize {
        self.fallback.lock().expect("dedup mutex poisoned").len()
    }

    /// Duplicate check that reports store failures instead of degrading.
    pub async fn try_is_duplicate(&self, hash: &str) -> Result<bool, StoreError> {
        match &self.backend {
            Backend::Durable(s) => {
                let seen = store::with_deadline(self.timeout, s.exists(&key(hash))).await?;
                Ok(seen || self.fallback_contains(hash))
            }
            Backend::InMemory => Ok(self.fallback_contains(hash)),
        }
    }

    pub async fn is_duplicate(&self, hash: &str) -> bool {
        let dup = match self.try_is_duplicate(hash).await {
            Ok(d) => d,
            Err(e) => {
                self.degraded("is_duplicate", &e);
                self.fallback_contains(hash)
            }
        };
        if dup {
            counter!("dedup_hits_total").increment(1);
        }
        dup
    }

    /// Record `hash` as seen. Marking twice only refreshes the TTL.
    pub async fn mark_seen(&self, hash: &str) {
        if let Backend::Durable(s) = &self.backend {
            let res = store::with_deadline(self.timeout, s.set_ex(&key(hash), "1", self.ttl)).await;
            match res {
                Ok(()) => return,
                Err(e) => self.degraded("mark_seen", &e),
            }
        }
        self.fallback_insert(hash);
    }

    /// Atomically mark `hash` as seen. Returns `true` if this caller is the
    /// first to see it (i.e. not a duplicate).
    pub async fn claim(&self, hash: &str) -> bool {
        if let Backend::Durable(s) = &self.backend {
            let res =
                store::with_deadline(self.timeout, s.set_nx_ex(&key(hash), "1", self.ttl)).await;
            match res {
                Ok(stored) => {
                    // hashes claimed during an outage now live in the store
                    let fresh = stored && !self.fallback_remove(hash);
                    if !fresh {
                        counter!("dedup_hits_total").increment(1);
                    }
                    return fresh;
                }
                Err(e) => self.degraded("claim", &e),
            }
        }
        let fresh = self.fallback_insert(hash);
        if !fresh {
            counter!("dedup_hits_total").increment(1);
        }
        fresh
    }

    pub async fn is_duplicate_text(&self, text: &str) -> bool {
        self.is_duplicate(&Self::hash_content(text)).await
    }

    /// Mark `text` as seen and return its hash.
    pub async fn mark_seen_text(&self, text: &str) -> String {
        let h = Self::hash_content(text);
        self.mark_seen(&h).await;
        h
    }

    fn fallback_contains(&self, hash: &str) -> bool {
        self.fallback
            .lock()
            .expect("dedup mutex poisoned")
            .contains(hash)
    }

    fn fallback_insert(&self, hash: &str) -> bool {
        self.fallback
            .lock()
            .expect("dedup mutex poisoned")
            .insert(hash.to_string())
    }

    fn fallback_remove(&self, hash: &str) -> bool {
        self.fallback
            .lock()
            .expect("dedup mutex poisoned")
            .remove(hash)
    }

    fn degraded(&self, op: &'static str, e: &StoreError) {
        tracing::warn!(component = "dedup", op, error = %e, "store call failed, using in-memory set");
        counter!("store_degraded_total", "component" => "dedup").increment(1);
        counter!("dedup_fallback_total").increment(1);
    }
}

fn key(hash: &str) -> String {
    format!("{DEDUP_KEY_PREFIX}{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_hex_sha256_of_raw_bytes() {
        let h = Deduplicator::hash_content("abc");
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        // raw text, no normalization: whitespace changes the key
        assert_ne!(h, Deduplicator::hash_content(" abc"));
    }

    #[tokio::test]
    async fn in_memory_mark_then_duplicate() {
        let d = Deduplicator::in_memory();
        let h = Deduplicator::hash_content("Fed holds rates");
        assert!(!d.is_duplicate(&h).await);
        d.mark_seen(&h).await;
        d.mark_seen(&h).await;
        assert!(d.is_duplicate(&h).await);
        assert_eq!(d.fallback_len(), 1);
        assert_eq!(d.backend(), BackendKind::InMemory);
    }

    #[tokio::test]
    async fn claim_is_first_caller_only() {
        let d = Deduplicator::in_memory();
        assert!(d.claim("h1").await);
        assert!(!d.claim("h1").await);
        assert!(d.claim("h2").await);
    }
}
