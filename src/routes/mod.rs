use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Duration;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::error::ApiError;
use crate::models::{LoginRequest, Token, UserType};
use crate::AppState;

pub mod admin;
pub mod bus;
pub mod gui;
pub mod student;

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/login", post(login))
        .nest("/admin", admin::router())
        .nest("/student", student::router())
        .nest("/bus", bus::router());
    if state.settings.gui_enabled {
        router = router.nest("/gui", gui::router());
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "School Bus Tracking API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "School Bus Tracking API is running",
    }))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Token>, ApiError> {
    let user_type = match request.user_type.as_str() {
        "student" => UserType::Student,
        "admin" => UserType::Admin,
        _ => return Err(ApiError::BadCredentials),
    };

    if !auth::authenticate(&state, &request.username, &request.password, user_type).await? {
        tracing::info!(username = %request.username, "login rejected");
        return Err(ApiError::BadCredentials);
    }

    let access_token = auth::create_access_token(
        &request.username,
        user_type,
        &state.settings.secret_key,
        Duration::minutes(state.settings.access_token_expire_minutes),
    )?;
    tracing::info!(username = %request.username, user_type = user_type.as_str(), "login");

    Ok(Json(Token {
        access_token,
        token_type: "bearer".to_string(),
        user_type,
    }))
}
