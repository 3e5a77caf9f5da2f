use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::eta::{self, EtaConfig, GeoPoint, StationEstimate, StationStatus};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").expect("valid username pattern"));
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ()-]{6,20}$").expect("valid phone pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Student,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Student => "student",
            UserType::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Bus {
    pub id: i64,
    pub bus_number: String,
    pub driver_name: String,
    pub driver_phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Station {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub bus_id: i64,
    pub order_number: i64,
}

impl Station {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn to_route_stop(&self) -> eta::Station {
        eta::Station {
            id: self.id,
            position: self.position(),
            bus_id: self.bus_id,
            order_index: self.order_number,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub password_hash: String,
    pub assigned_bus_id: Option<i64>,
    pub assigned_station_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusLocation {
    pub id: i64,
    pub bus_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl BusLocation {
    pub fn to_fix(&self) -> eta::BusFix {
        eta::BusFix {
            bus_id: self.bus_id,
            position: GeoPoint::new(self.latitude, self.longitude),
            timestamp: self.timestamp,
        }
    }
}

// Request payloads

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub user_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub user_type: UserType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusCreate {
    pub bus_number: String,
    pub driver_name: String,
    pub driver_phone: String,
}

impl BusCreate {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.bus_number.trim().is_empty() {
            return Err(ApiError::BadRequest("bus_number must not be empty".into()));
        }
        if !PHONE_RE.is_match(&self.driver_phone) {
            return Err(ApiError::BadRequest(format!(
                "Invalid driver phone '{}'",
                self.driver_phone
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationCreate {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub bus_id: i64,
    pub order_number: i64,
}

impl StationCreate {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_coordinates(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationUpdate {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub order_number: Option<i64>,
}

impl StationUpdate {
    pub fn apply(&self, station: &mut Station) -> Result<(), ApiError> {
        let latitude = self.latitude.unwrap_or(station.latitude);
        let longitude = self.longitude.unwrap_or(station.longitude);
        validate_coordinates(latitude, longitude)?;

        if let Some(name) = &self.name {
            station.name = name.clone();
        }
        station.latitude = latitude;
        station.longitude = longitude;
        if let Some(order_number) = self.order_number {
            station.order_number = order_number;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudentCreate {
    pub name: String,
    pub username: String,
    pub password: String,
    pub assigned_bus_id: Option<i64>,
    pub assigned_station_id: Option<i64>,
}

impl StudentCreate {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_username(&self.username)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminCreate {
    pub username: String,
    pub password: String,
}

impl AdminCreate {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_username(&self.username)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusLocationCreate {
    pub bus_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl BusLocationCreate {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_coordinates(self.latitude, self.longitude)
    }
}

// Response payloads

#[derive(Debug, Clone, Serialize)]
pub struct StudentResponse {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub assigned_bus_id: Option<i64>,
    pub assigned_station_id: Option<i64>,
}

impl From<&Student> for StudentResponse {
    fn from(student: &Student) -> Self {
        Self {
            id: student.id,
            name: student.name.clone(),
            username: student.username.clone(),
            assigned_bus_id: student.assigned_bus_id,
            assigned_station_id: student.assigned_station_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StationWithStatus {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub bus_id: i64,
    pub order_number: i64,
    pub status: StationStatus,
    pub eta_minutes: Option<u32>,
}

impl StationWithStatus {
    pub fn new(station: &Station, estimate: StationEstimate) -> Self {
        Self {
            id: station.id,
            name: station.name.clone(),
            latitude: station.latitude,
            longitude: station.longitude,
            bus_id: station.bus_id,
            order_number: station.order_number,
            status: estimate.status,
            eta_minutes: estimate.eta_minutes,
        }
    }
}

/// Status of every station on a route against the bus's latest fix.
pub fn route_status(
    config: &EtaConfig,
    stations: &[Station],
    latest: Option<&BusLocation>,
) -> Vec<StationWithStatus> {
    let route: Vec<eta::Station> = stations.iter().map(Station::to_route_stop).collect();
    let fix = latest.map(BusLocation::to_fix);
    stations
        .iter()
        .zip(&route)
        .map(|(station, stop)| {
            let estimate = eta::station_status(config, fix.as_ref(), stop, &route);
            StationWithStatus::new(station, estimate)
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), ApiError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ApiError::BadRequest(format!("Latitude {} out of range", latitude)));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ApiError::BadRequest(format!("Longitude {} out of range", longitude)));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Invalid username '{}'", username)))
    }
}
