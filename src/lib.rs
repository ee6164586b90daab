// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod alerts;
pub mod api;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod index;
pub mod ingest;
pub mod metrics;
pub mod retrieve;
pub mod sentiment;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::alerts::{Alert, AlertEngine, AlertSink, AlertType, PriceQuote, Severity};
pub use crate::api::{create_router, AppState};
pub use crate::config::Settings;
pub use crate::dedup::Deduplicator;
pub use crate::retrieve::{RankedChunk, RetrieveError, TimeWeightedRetriever};
pub use crate::store::{BackendKind, MemoryTtlStore, RedisTtlStore, StoreError, TtlStore};

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::StoreSettings;
use crate::index::{MemoryIndex, SimilarityIndex};
use crate::retrieve::RetrievalParams;

/// Open the shared store named by `settings`. No URL, or a connect that fails
/// within the deadline, yields `None` and every component runs in memory.
pub async fn connect_store(settings: &StoreSettings) -> Option<Arc<dyn TtlStore>> {
    let Some(url) = settings.redis_url.as_deref() else {
        info!("no redis url configured, state stays in memory");
        return None;
    };
    match store::with_deadline(settings.connect_timeout(), RedisTtlStore::connect(url)).await {
        Ok(s) => {
            let shared: Arc<dyn TtlStore> = Arc::new(s);
            Some(shared)
        }
        Err(e) => {
            warn!(error = %e, "redis connect failed, state stays in memory");
            None
        }
    }
}

/// Build the shared state from `settings`. `store` is probed once per
/// component; `None` runs everything in memory. Chunks go to an in-process
/// [`MemoryIndex`].
pub async fn build_state(settings: &Settings, store: Option<Arc<dyn TtlStore>>) -> AppState {
    let clock = clock::system_clock();
    let dedup = Deduplicator::connect(store.clone(), &settings.dedup).await;
    let alerts = AlertEngine::connect(store, settings.alerts.clone(), clock.clone()).await;
    let index: Arc<dyn SimilarityIndex> = Arc::new(MemoryIndex::new());
    let retriever = TimeWeightedRetriever::with_clock(
        index.clone(),
        RetrievalParams::from(&settings.retrieval),
        clock,
    );

    crate::metrics::record_backend("dedup", dedup.backend());
    crate::metrics::record_backend("cooldown", alerts.backend());
    info!(
        dedup_backend = dedup.backend().as_str(),
        cooldown_backend = alerts.backend().as_str(),
        "state ready"
    );

    AppState {
        dedup: Arc::new(dedup),
        alerts: Arc::new(alerts),
        index,
        retriever: Arc::new(retriever),
    }
}
