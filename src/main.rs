//! finsight core service: binary entrypoint.
//! Boots the Axum HTTP server with health, alert history and metrics routes.

use std::time::Duration;

use finsight::ingest::spawn_expiry_sweep;
use finsight::{api, build_state, connect_store, metrics::Metrics, Settings};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXPIRY_SWEEP_EVERY: Duration = Duration::from_secs(3600);

/// Compact tracing logs; `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("finsight=info,warn"));

    // Shuttle may already have installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let settings = Settings::load_default()?;

    let store = connect_store(&settings.store).await;
    let state = build_state(&settings, store).await;
    spawn_expiry_sweep(
        state.index.clone(),
        settings.chunking.news_expiry_days,
        EXPIRY_SWEEP_EVERY,
    );

    let mut router = api::create_router(state);
    match Metrics::init() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = ?e, "metrics exporter disabled"),
    }

    Ok(router.into())
}
