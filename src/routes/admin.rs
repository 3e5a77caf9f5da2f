use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::auth::{self, AdminUser};
use crate::error::ApiError;
use crate::models::{
    AdminCreate, Bus, BusCreate, Message, Station, StationCreate, StationUpdate, StudentCreate,
    StudentResponse,
};
use crate::store::NewStudent;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create-admin", post(create_admin))
        .route("/buses", post(create_bus).get(list_buses))
        .route("/stations", post(create_station))
        .route(
            "/stations/{id}",
            get(list_stations).put(update_station).delete(delete_station),
        )
        .route("/students", post(create_student).get(list_students))
}

// Open only while no admin exists.
async fn create_admin(
    State(state): State<Arc<AppState>>,
    Json(admin): Json<AdminCreate>,
) -> Result<Json<Message>, ApiError> {
    admin.validate()?;
    let hash = auth::hash_password(admin.password, state.settings.bcrypt_cost).await?;
    let created = state.store.create_first_admin(admin.username, hash).await?;
    tracing::info!(username = %created.username, "admin created");
    Ok(Json(Message::new("Admin created successfully")))
}

async fn create_bus(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(bus): Json<BusCreate>,
) -> Result<Json<Bus>, ApiError> {
    bus.validate()?;
    let bus = state.store.create_bus(bus).await?;
    tracing::info!(bus_id = bus.id, bus_number = %bus.bus_number, "bus created");
    Ok(Json(bus))
}

async fn list_buses(State(state): State<Arc<AppState>>, _admin: AdminUser) -> Json<Vec<Bus>> {
    Json(state.store.buses().await)
}

async fn create_station(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(station): Json<StationCreate>,
) -> Result<Json<Station>, ApiError> {
    station.validate()?;
    let station = state.store.create_station(station).await?;
    tracing::info!(station_id = station.id, bus_id = station.bus_id, "station created");
    Ok(Json(station))
}

// `id` is the bus id here.
async fn list_stations(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(bus_id): Path<i64>,
) -> Json<Vec<Station>> {
    Json(state.store.stations_for_bus(bus_id).await)
}

async fn update_station(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(station_id): Path<i64>,
    Json(update): Json<StationUpdate>,
) -> Result<Json<Station>, ApiError> {
    let station = state.store.update_station(station_id, &update).await?;
    tracing::info!(station_id, "station updated");
    Ok(Json(station))
}

async fn delete_station(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(station_id): Path<i64>,
) -> Result<Json<Message>, ApiError> {
    state.store.delete_station(station_id).await?;
    tracing::info!(station_id, "station deleted");
    Ok(Json(Message::new("Station deleted successfully")))
}

async fn create_student(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(student): Json<StudentCreate>,
) -> Result<Json<StudentResponse>, ApiError> {
    student.validate()?;
    let password_hash = auth::hash_password(student.password, state.settings.bcrypt_cost).await?;
    let student = state
        .store
        .create_student(NewStudent {
            name: student.name,
            username: student.username,
            password_hash,
            assigned_bus_id: student.assigned_bus_id,
            assigned_station_id: student.assigned_station_id,
        })
        .await?;
    tracing::info!(student_id = student.id, username = %student.username, "student created");
    Ok(Json(StudentResponse::from(&student)))
}

async fn list_students(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Json<Vec<StudentResponse>> {
    let students = state.store.students().await;
    Json(students.iter().map(StudentResponse::from).collect())
}
