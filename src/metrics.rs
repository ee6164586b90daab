use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::store::BackendKind;

static DESCRIBED: OnceCell<()> = OnceCell::new();

/// Register help text for every series this crate emits. Idempotent; called
/// by each component constructor so descriptions exist whichever one runs first.
pub fn ensure_metrics_described() {
    DESCRIBED.get_or_init(|| {
        describe_counter!("dedup_hits_total", "Content hashes found already seen");
        describe_counter!(
            "dedup_fallback_total",
            "Dedup lookups answered by the in-process set"
        );
        describe_counter!(
            "store_degraded_total",
            "Durable store calls that failed and fell back to local state"
        );
        describe_counter!("ingest_articles_total", "Articles handed to the ingest pipeline");
        describe_counter!("ingest_chunks_total", "Chunks produced and indexed");
        describe_counter!("ingest_skipped_total", "Articles skipped, by reason");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            Unit::Seconds,
            "Unix time of the last completed ingest run"
        );
        describe_counter!("retrieval_requests_total", "Retrieval calls");
        describe_counter!(
            "retrieval_failures_total",
            "Retrievals that failed or timed out and returned no context"
        );
        describe_histogram!(
            "retrieval_candidates",
            Unit::Count,
            "Candidates returned by the similarity index per retrieval"
        );
        describe_counter!("alerts_fired_total", "Alerts fired, by type");
        describe_counter!("alerts_suppressed_total", "Alerts suppressed by cooldown, by type");
        describe_gauge!(
            "store_backend_durable",
            "1 when the component runs on the durable store, 0 on in-memory"
        );
    });
}

/// Export which backend a component settled on after its startup probe.
pub fn record_backend(component: &'static str, kind: BackendKind) {
    let v = match kind {
        BackendKind::Durable => 1.0,
        BackendKind::InMemory => 0.0,
    };
    gauge!("store_backend_durable", "component" => component).set(v);
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// A recorder that is not installed globally; renders only what is
    /// recorded through it directly.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describing_twice_is_harmless() {
        ensure_metrics_described();
        ensure_metrics_described();
        assert!(DESCRIBED.get().is_some());
    }
}
