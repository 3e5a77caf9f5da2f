//! Server-rendered pages: a live dashboard, an admin console with creation
//! forms, a student overview and a bus simulator that posts GPS fixes.
//!
//! Form posts answer with a 303 back to their page carrying `?success=` or
//! `?error=`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
    routing::{get, post},
    Form, Router,
};
use chrono::Utc;
use maud::{html, Markup, DOCTYPE};
use serde::{Deserialize, Deserializer};

use crate::auth;
use crate::error::ApiError;
use crate::models::{
    route_status, AdminCreate, Bus, BusCreate, BusLocation, BusLocationCreate, StationCreate,
    StationWithStatus, StudentCreate,
};
use crate::store::NewStudent;
use crate::AppState;

const ADMIN_PAGE: &str = "/gui/admin";
const SIMULATOR_PAGE: &str = "/gui/bus-simulator";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(dashboard))
        .route("/admin", get(admin_page))
        .route("/admin/create-bus", post(create_bus_form))
        .route("/admin/create-station", post(create_station_form))
        .route("/admin/create-student", post(create_student_form))
        .route("/admin/create-admin", post(create_admin_form))
        .route("/student", get(student_page))
        .route("/bus-simulator", get(simulator_page))
        .route("/bus-simulator/update", post(simulator_update))
        .route("/api-docs", get(api_docs))
}

#[derive(Debug, Default, Deserialize)]
struct Notice {
    success: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StudentForm {
    name: String,
    username: String,
    password: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    assigned_bus_id: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    assigned_station_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SimulatorForm {
    bus_id: i64,
    latitude: f64,
    longitude: f64,
}

// An unselected <select> posts an empty string.
fn empty_as_none<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn redirect(page: &str, outcome: Result<String, ApiError>) -> Redirect {
    let query = match outcome {
        Ok(message) => serde_urlencoded::to_string(&[("success", message.as_str())]),
        Err(e) => {
            tracing::info!(page, "form rejected: {}", e);
            serde_urlencoded::to_string(&[("error", e.to_string().as_str())])
        }
    };
    match query {
        Ok(query) => Redirect::to(&format!("{}?{}", page, query)),
        Err(_) => Redirect::to(page),
    }
}

fn layout(title: &str, notice: &Notice, content: Markup) -> Html<String> {
    let page = html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (title) " | School Bus Tracking" }
            }
            body {
                nav {
                    a href="/gui" { "Dashboard" } " | "
                    a href="/gui/admin" { "Admin" } " | "
                    a href="/gui/student" { "Student" } " | "
                    a href="/gui/bus-simulator" { "Bus simulator" } " | "
                    a href="/gui/api-docs" { "API" }
                }
                h1 { (title) }
                @if let Some(message) = &notice.success {
                    p.notice.success { (message) }
                }
                @if let Some(message) = &notice.error {
                    p.notice.error { (message) }
                }
                (content)
            }
        }
    };
    Html(page.into_string())
}

fn eta_cell(station: &StationWithStatus) -> String {
    station
        .eta_minutes
        .map(|m| m.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn last_seen(latest: Option<&BusLocation>) -> Markup {
    html! {
        @match latest {
            Some(fix) => {
                span.last-seen {
                    (fix.latitude) ", " (fix.longitude) " at "
                    (fix.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                }
            }
            None => {
                span.last-seen { "never reported" }
            }
        }
    }
}

fn bus_section(bus: &Bus, stations: &[StationWithStatus]) -> Markup {
    html! {
        section.bus data-bus-id=(bus.id) {
            h2 { "Bus " (bus.bus_number) }
            p { "Driver: " (bus.driver_name) " (" (bus.driver_phone) ")" }
            @if stations.is_empty() {
                p.empty { "No stations" }
            } @else {
                table {
                    tr { th { "#" } th { "Station" } th { "Status" } th { "ETA (min)" } }
                    @for station in stations {
                        tr class=(format!("station {}", station.status.as_str())) {
                            td { (station.order_number) }
                            td { (station.name) }
                            td { (station.status.as_str()) }
                            td { (eta_cell(station)) }
                        }
                    }
                }
            }
        }
    }
}

async fn dashboard(State(state): State<Arc<AppState>>) -> Html<String> {
    let config = state.settings.eta_config();
    let mut sections = Vec::new();
    for bus in state.store.buses().await {
        let snapshot = state.store.route_snapshot(bus.id).await;
        let stations = route_status(&config, &snapshot.stations, snapshot.latest.as_ref());
        sections.push(bus_section(&bus, &stations));
    }
    layout(
        "Dashboard",
        &Notice::default(),
        html! {
            @if sections.is_empty() {
                p.empty { "No buses registered" }
            }
            @for section in sections {
                (section)
            }
        },
    )
}

async fn admin_page(
    State(state): State<Arc<AppState>>,
    Query(notice): Query<Notice>,
) -> Html<String> {
    let buses = state.store.buses().await;
    let mut stations = Vec::new();
    for bus in &buses {
        stations.extend(state.store.stations_for_bus(bus.id).await);
    }
    let students = state.store.students().await;

    let content = html! {
        h2 { "Buses" }
        table #buses {
            tr { th { "ID" } th { "Number" } th { "Driver" } th { "Phone" } }
            @for bus in &buses {
                tr.bus { td { (bus.id) } td { (bus.bus_number) } td { (bus.driver_name) } td { (bus.driver_phone) } }
            }
        }
        h2 { "Stations" }
        table #stations {
            tr { th { "ID" } th { "Bus" } th { "#" } th { "Name" } th { "Latitude" } th { "Longitude" } }
            @for station in &stations {
                tr.station {
                    td { (station.id) } td { (station.bus_id) } td { (station.order_number) }
                    td { (station.name) } td { (station.latitude) } td { (station.longitude) }
                }
            }
        }
        h2 { "Students" }
        table #students {
            tr { th { "ID" } th { "Name" } th { "Username" } th { "Bus" } th { "Station" } }
            @for student in &students {
                tr.student {
                    td { (student.id) } td { (student.name) } td { (student.username) }
                    td { (student.assigned_bus_id.map(|id| id.to_string()).unwrap_or_default()) }
                    td { (student.assigned_station_id.map(|id| id.to_string()).unwrap_or_default()) }
                }
            }
        }

        h2 { "Create bus" }
        form method="post" action="/gui/admin/create-bus" {
            input type="text" name="bus_number" placeholder="Bus number" required;
            input type="text" name="driver_name" placeholder="Driver name" required;
            input type="text" name="driver_phone" placeholder="Driver phone" required;
            button type="submit" { "Create bus" }
        }
        h2 { "Create station" }
        form method="post" action="/gui/admin/create-station" {
            input type="text" name="name" placeholder="Name" required;
            input type="number" step="any" name="latitude" placeholder="Latitude" required;
            input type="number" step="any" name="longitude" placeholder="Longitude" required;
            select name="bus_id" required {
                @for bus in &buses {
                    option value=(bus.id) { (bus.bus_number) }
                }
            }
            input type="number" name="order_number" placeholder="Order" required;
            button type="submit" { "Create station" }
        }
        h2 { "Create student" }
        form method="post" action="/gui/admin/create-student" {
            input type="text" name="name" placeholder="Name" required;
            input type="text" name="username" placeholder="Username" required;
            input type="password" name="password" placeholder="Password" required;
            select name="assigned_bus_id" {
                option value="" { "No bus" }
                @for bus in &buses {
                    option value=(bus.id) { (bus.bus_number) }
                }
            }
            select name="assigned_station_id" {
                option value="" { "No station" }
                @for station in &stations {
                    option value=(station.id) { (station.name) }
                }
            }
            button type="submit" { "Create student" }
        }
        h2 { "Create admin" }
        form method="post" action="/gui/admin/create-admin" {
            input type="text" name="username" placeholder="Username" required;
            input type="password" name="password" placeholder="Password" required;
            button type="submit" { "Create admin" }
        }
    };
    layout("Admin", &notice, content)
}

async fn add_bus(state: &AppState, bus: BusCreate) -> Result<String, ApiError> {
    bus.validate()?;
    let bus = state.store.create_bus(bus).await?;
    Ok(format!("Bus {} created successfully", bus.bus_number))
}

async fn create_bus_form(
    State(state): State<Arc<AppState>>,
    Form(bus): Form<BusCreate>,
) -> Redirect {
    redirect(ADMIN_PAGE, add_bus(&state, bus).await)
}

async fn add_station(state: &AppState, station: StationCreate) -> Result<String, ApiError> {
    station.validate()?;
    let station = state.store.create_station(station).await?;
    Ok(format!("Station {} created successfully", station.name))
}

async fn create_station_form(
    State(state): State<Arc<AppState>>,
    Form(station): Form<StationCreate>,
) -> Redirect {
    redirect(ADMIN_PAGE, add_station(&state, station).await)
}

async fn add_student(state: &AppState, form: StudentForm) -> Result<String, ApiError> {
    let student = StudentCreate {
        name: form.name,
        username: form.username,
        password: form.password,
        assigned_bus_id: form.assigned_bus_id,
        assigned_station_id: form.assigned_station_id,
    };
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
    Ok(format!("Student {} created successfully", student.username))
}

async fn create_student_form(
    State(state): State<Arc<AppState>>,
    Form(form): Form<StudentForm>,
) -> Redirect {
    redirect(ADMIN_PAGE, add_student(&state, form).await)
}

async fn add_admin(state: &AppState, admin: AdminCreate) -> Result<String, ApiError> {
    admin.validate()?;
    let hash = auth::hash_password(admin.password, state.settings.bcrypt_cost).await?;
    let admin = state.store.create_first_admin(admin.username, hash).await?;
    tracing::info!(username = %admin.username, "admin created from console");
    Ok("Admin created successfully".to_string())
}

async fn create_admin_form(
    State(state): State<Arc<AppState>>,
    Form(admin): Form<AdminCreate>,
) -> Redirect {
    redirect(ADMIN_PAGE, add_admin(&state, admin).await)
}

async fn student_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let mut rows = Vec::new();
    for bus in state.store.buses().await {
        let latest = state.store.latest_location(bus.id).await;
        rows.push((bus, latest));
    }
    let content = html! {
        p { "Log in through " code { "POST /login" } " to see the status of your own station." }
        table #buses {
            tr { th { "Bus" } th { "Driver" } th { "Last position" } }
            @for (bus, latest) in &rows {
                tr.bus {
                    td { (bus.bus_number) }
                    td { (bus.driver_name) }
                    td { (last_seen(latest.as_ref())) }
                }
            }
        }
    };
    layout("Student", &Notice::default(), content)
}

async fn simulator_page(
    State(state): State<Arc<AppState>>,
    Query(notice): Query<Notice>,
) -> Html<String> {
    let mut rows = Vec::new();
    for bus in state.store.buses().await {
        let latest = state.store.latest_location(bus.id).await;
        rows.push((bus, latest));
    }
    let content = html! {
        table #buses {
            tr { th { "Bus" } th { "Last position" } }
            @for (bus, latest) in &rows {
                tr.bus data-bus-id=(bus.id) {
                    td { (bus.bus_number) }
                    td { (last_seen(latest.as_ref())) }
                }
            }
        }
        h2 { "Report position" }
        form method="post" action="/gui/bus-simulator/update" {
            select name="bus_id" required {
                @for (bus, _) in &rows {
                    option value=(bus.id) { (bus.bus_number) }
                }
            }
            input type="number" step="any" name="latitude" placeholder="Latitude" required;
            input type="number" step="any" name="longitude" placeholder="Longitude" required;
            button type="submit" { "Send" }
        }
    };
    layout("Bus simulator", &notice, content)
}

async fn report_position(state: &AppState, form: SimulatorForm) -> Result<String, ApiError> {
    let location = BusLocationCreate {
        bus_id: form.bus_id,
        latitude: form.latitude,
        longitude: form.longitude,
        timestamp: None,
    };
    location.validate()?;
    let record = state.store.record_location(location, Utc::now()).await?;
    tracing::debug!(bus_id = record.bus_id, "simulated location recorded");
    Ok("Location updated successfully".to_string())
}

async fn simulator_update(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SimulatorForm>,
) -> Redirect {
    redirect(SIMULATOR_PAGE, report_position(&state, form).await)
}

const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("POST", "/login", "Log in as student or admin"),
    ("POST", "/admin/create-admin", "Create the first admin"),
    ("GET/POST", "/admin/buses", "List or create buses"),
    ("POST", "/admin/stations", "Create a station"),
    ("GET", "/admin/stations/{bus_id}", "Stations of a bus"),
    ("PUT/DELETE", "/admin/stations/{station_id}", "Update or delete a station"),
    ("GET/POST", "/admin/students", "List or create students"),
    ("POST", "/bus/update", "Report a GPS fix"),
    ("GET", "/bus/locations/{bus_id}", "Location history"),
    ("GET", "/student/stations/{bus_id}", "Stations with status and ETA"),
    ("GET", "/student/bus/{bus_id}", "Bus details"),
    ("GET", "/student/bus/{bus_id}/location", "Latest bus position"),
    ("GET", "/student/my-bus", "Assigned bus"),
    ("GET", "/student/my-station", "Assigned station with status"),
];

async fn api_docs() -> Html<String> {
    let content = html! {
        table #endpoints {
            tr { th { "Method" } th { "Path" } th { "Purpose" } }
            @for (method, path, purpose) in ENDPOINTS {
                tr { td { (method) } td { code { (path) } } td { (purpose) } }
            }
        }
    };
    layout("API", &Notice::default(), content)
}
