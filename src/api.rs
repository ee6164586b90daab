use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::alerts::{Alert, AlertEngine};
use crate::dedup::Deduplicator;
use crate::index::SimilarityIndex;
use crate::retrieve::TimeWeightedRetriever;
use crate::store::BackendKind;

/// Upper bound for `/alerts?limit=`.
pub const MAX_ALERTS_LIMIT: usize = 500;
const DEFAULT_ALERTS_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub dedup: Arc<Deduplicator>,
    pub alerts: Arc<AlertEngine>,
    pub index: Arc<dyn SimilarityIndex>,
    pub retriever: Arc<TimeWeightedRetriever>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/alerts", get(recent_alerts))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct HealthResp {
    status: &'static str,
    dedup_backend: BackendKind,
    cooldown_backend: BackendKind,
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    let dedup_backend = state.dedup.backend();
    let cooldown_backend = state.alerts.backend();
    let status = if dedup_backend == BackendKind::Durable && cooldown_backend == BackendKind::Durable
    {
        "healthy"
    } else {
        "degraded"
    };
    Json(HealthResp {
        status,
        dedup_backend,
        cooldown_backend,
    })
}

#[derive(serde::Deserialize)]
struct AlertsQuery {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(serde::Serialize)]
struct AlertsResp {
    alerts: Vec<Alert>,
}

async fn recent_alerts(
    State(state): State<AppState>,
    Query(q): Query<AlertsQuery>,
) -> Json<AlertsResp> {
    let limit = q
        .limit
        .unwrap_or(DEFAULT_ALERTS_LIMIT)
        .min(MAX_ALERTS_LIMIT);
    let alerts = state.alerts.get_recent_alerts(limit).await;
    Json(AlertsResp { alerts })
}
