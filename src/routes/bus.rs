use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::models::{BusLocation, BusLocationCreate};
use crate::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 50;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/update", post(update_location))
        .route("/locations/{bus_id}", get(location_history))
        .route("/health", get(health))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

// Called by the on-board GPS units, no auth.
async fn update_location(
    State(state): State<Arc<AppState>>,
    Json(location): Json<BusLocationCreate>,
) -> Result<Json<BusLocation>, ApiError> {
    location.validate()?;
    let record = state.store.record_location(location, Utc::now()).await?;
    tracing::debug!(
        bus_id = record.bus_id,
        lat = record.latitude,
        lon = record.longitude,
        "location recorded"
    );
    Ok(Json(record))
}

async fn location_history(
    State(state): State<Arc<AppState>>,
    Path(bus_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<BusLocation>>, ApiError> {
    state
        .store
        .bus(bus_id)
        .await
        .ok_or(ApiError::NotFound("Bus"))?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.store.location_history(bus_id, limit).await))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Bus API is running" }))
}
