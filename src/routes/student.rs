use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::auth::StudentUser;
use crate::error::ApiError;
use crate::eta;
use crate::models::{route_status, Bus, BusLocation, Station, StationWithStatus, Student};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stations/{bus_id}", get(stations_with_status))
        .route("/bus/{bus_id}", get(bus_info))
        .route("/bus/{bus_id}/location", get(bus_location))
        .route("/my-bus", get(my_bus))
        .route("/my-station", get(my_station))
}

fn ensure_assigned(student: &Student, bus_id: i64) -> Result<(), ApiError> {
    if student.assigned_bus_id == Some(bus_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Access denied to this bus"))
    }
}

async fn stations_with_status(
    State(state): State<Arc<AppState>>,
    StudentUser(student): StudentUser,
    Path(bus_id): Path<i64>,
) -> Result<Json<Vec<StationWithStatus>>, ApiError> {
    ensure_assigned(&student, bus_id)?;
    let snapshot = state.store.route_snapshot(bus_id).await;
    Ok(Json(route_status(
        &state.settings.eta_config(),
        &snapshot.stations,
        snapshot.latest.as_ref(),
    )))
}

async fn bus_info(
    State(state): State<Arc<AppState>>,
    StudentUser(student): StudentUser,
    Path(bus_id): Path<i64>,
) -> Result<Json<Bus>, ApiError> {
    ensure_assigned(&student, bus_id)?;
    let bus = state
        .store
        .bus(bus_id)
        .await
        .ok_or(ApiError::NotFound("Bus"))?;
    Ok(Json(bus))
}

async fn bus_location(
    State(state): State<Arc<AppState>>,
    StudentUser(student): StudentUser,
    Path(bus_id): Path<i64>,
) -> Result<Json<Option<BusLocation>>, ApiError> {
    ensure_assigned(&student, bus_id)?;
    Ok(Json(state.store.latest_location(bus_id).await))
}

async fn my_bus(
    State(state): State<Arc<AppState>>,
    StudentUser(student): StudentUser,
) -> Json<Option<Bus>> {
    let bus = match student.assigned_bus_id {
        Some(bus_id) => state.store.bus(bus_id).await,
        None => None,
    };
    Json(bus)
}

async fn my_station(
    State(state): State<Arc<AppState>>,
    StudentUser(student): StudentUser,
) -> Json<Option<StationWithStatus>> {
    let (Some(bus_id), Some(station_id)) = (student.assigned_bus_id, student.assigned_station_id)
    else {
        return Json(None);
    };
    let Some(station) = state.store.station(station_id).await else {
        return Json(None);
    };

    let snapshot = state.store.route_snapshot(bus_id).await;
    let route: Vec<eta::Station> = snapshot.stations.iter().map(Station::to_route_stop).collect();
    let fix = snapshot.latest.as_ref().map(BusLocation::to_fix);
    let estimate = eta::station_status(
        &state.settings.eta_config(),
        fix.as_ref(),
        &station.to_route_stop(),
        &route,
    );
    Json(Some(StationWithStatus::new(&station, estimate)))
}
