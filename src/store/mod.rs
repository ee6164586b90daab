//! Durable key/value store seam used by the deduplicator and the alert engine.
//!
//! The shape mirrors a Redis-style server: string keys with expiry, an
//! atomic set-if-absent, and a length-bounded list for history.
//! [`redis_store::RedisTtlStore`] is the shared backend for multi-process
//! deployments; [`memory::MemoryTtlStore`] implements the same contract
//! in-process for tests and is never reported as shared state.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryTtlStore;
pub use redis_store::RedisTtlStore;

/// Key prefix for content-hash dedup records.
pub const DEDUP_KEY_PREFIX: &str = "finsight:dedup:";
/// Key prefix for alert cooldown entries.
pub const ALERT_KEY_PREFIX: &str = "finsight:alert:";
/// List key holding serialized alert history, newest first.
pub const ALERT_HISTORY_KEY: &str = "finsight:alert_history";

/// Errors surfaced by a [`TtlStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection refused, reset, or the server rejected the command.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured deadline.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Which backend a stateful component ended up on after its startup probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Durable,
    InMemory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Durable => "durable",
            BackendKind::InMemory => "in_memory",
        }
    }
}

#[async_trait]
pub trait TtlStore: Send + Sync {
    /// Connectivity probe used once at construction time.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Set `key` unconditionally, (re)starting its expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Set `key` only if it is absent (or expired). Returns `true` when this
    /// call created the key. Must be atomic with respect to other callers.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Prepend `value` to the list at `key` and trim it to `cap` entries.
    async fn push_bounded(&self, key: &str, value: String, cap: usize) -> Result<(), StoreError>;

    /// Up to `limit` entries from the head (newest first) of the list at `key`.
    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError>;
}

/// Run a store call under a deadline, folding an elapsed deadline into
/// [`StoreError::Timeout`].
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}

/// Probe `store` and report whether it should be used. Failures are logged,
/// never returned: callers degrade to their in-memory path.
pub async fn probe(store: &dyn TtlStore, component: &'static str, deadline: Duration) -> bool {
    match with_deadline(deadline, store.ping()).await {
        Ok(()) => {
            tracing::info!(component, backend = "durable", "store probe ok");
            true
        }
        Err(e) => {
            tracing::warn!(
                component,
                error = %e,
                "durable store unreachable, using in-memory fallback"
            );
            false
        }
    }
}
