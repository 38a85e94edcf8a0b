//! Liveness/readiness probe (SPEC_FULL.md §6).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use artifactor_cache::CacheStats;

use crate::app::HubState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cache: CacheStats,
    pub metrics: Value,
}

pub async fn health(State(state): State<Arc<HubState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        cache: state.cache.stats(),
        metrics: state.metrics.export_json(),
    })
}
