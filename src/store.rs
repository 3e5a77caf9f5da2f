//! In-memory entity tables shared by all request handlers.
//!
//! A single `RwLock` guards every table so cross-table checks (a station's
//! bus exists, a username is free) are consistent with the write that
//! follows them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::models::{
    Admin, Bus, BusCreate, BusLocation, BusLocationCreate, Station, StationCreate, StationUpdate,
    Student,
};

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    buses: BTreeMap<i64, Bus>,
    stations: BTreeMap<i64, Station>,
    students: BTreeMap<i64, Student>,
    admins: BTreeMap<i64, Admin>,
    locations: Vec<BusLocation>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A new student, with the password already hashed.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub username: String,
    pub password_hash: String,
    pub assigned_bus_id: Option<i64>,
    pub assigned_station_id: Option<i64>,
}

/// Everything the student status views need for one bus.
#[derive(Debug, Clone)]
pub struct RouteSnapshot {
    pub stations: Vec<Station>,
    pub latest: Option<BusLocation>,
}

#[derive(Debug, Default)]
pub struct Store {
    tables: RwLock<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // Buses

    pub async fn create_bus(&self, bus: BusCreate) -> Result<Bus, ApiError> {
        let mut t = self.tables.write().await;
        if t.buses.values().any(|b| b.bus_number == bus.bus_number) {
            return Err(ApiError::Conflict("Bus number already exists".into()));
        }
        let id = t.allocate_id();
        let bus = Bus {
            id,
            bus_number: bus.bus_number,
            driver_name: bus.driver_name,
            driver_phone: bus.driver_phone,
        };
        t.buses.insert(id, bus.clone());
        Ok(bus)
    }

    pub async fn buses(&self) -> Vec<Bus> {
        self.tables.read().await.buses.values().cloned().collect()
    }

    pub async fn bus(&self, bus_id: i64) -> Option<Bus> {
        self.tables.read().await.buses.get(&bus_id).cloned()
    }

    pub async fn bus_by_number(&self, bus_number: &str) -> Option<Bus> {
        let t = self.tables.read().await;
        t.buses.values().find(|b| b.bus_number == bus_number).cloned()
    }

    // Stations

    pub async fn create_station(&self, station: StationCreate) -> Result<Station, ApiError> {
        let mut t = self.tables.write().await;
        if !t.buses.contains_key(&station.bus_id) {
            return Err(ApiError::NotFound("Bus"));
        }
        let id = t.allocate_id();
        let station = Station {
            id,
            name: station.name,
            latitude: station.latitude,
            longitude: station.longitude,
            bus_id: station.bus_id,
            order_number: station.order_number,
        };
        t.stations.insert(id, station.clone());
        Ok(station)
    }

    pub async fn station(&self, station_id: i64) -> Option<Station> {
        self.tables.read().await.stations.get(&station_id).cloned()
    }

    /// Stations of one bus, ordered by `order_number`.
    pub async fn stations_for_bus(&self, bus_id: i64) -> Vec<Station> {
        let t = self.tables.read().await;
        sorted_route(&t, bus_id)
    }

    pub async fn update_station(
        &self,
        station_id: i64,
        update: &StationUpdate,
    ) -> Result<Station, ApiError> {
        let mut t = self.tables.write().await;
        let station = t
            .stations
            .get_mut(&station_id)
            .ok_or(ApiError::NotFound("Station"))?;
        update.apply(station)?;
        Ok(station.clone())
    }

    pub async fn delete_station(&self, station_id: i64) -> Result<Station, ApiError> {
        let mut t = self.tables.write().await;
        let removed = t
            .stations
            .remove(&station_id)
            .ok_or(ApiError::NotFound("Station"))?;
        for student in t.students.values_mut() {
            if student.assigned_station_id == Some(station_id) {
                student.assigned_station_id = None;
            }
        }
        Ok(removed)
    }

    // Students

    pub async fn create_student(&self, student: NewStudent) -> Result<Student, ApiError> {
        let mut t = self.tables.write().await;
        if t.students.values().any(|s| s.username == student.username) {
            return Err(ApiError::Conflict("Username already registered".into()));
        }
        if let Some(bus_id) = student.assigned_bus_id {
            if !t.buses.contains_key(&bus_id) {
                return Err(ApiError::NotFound("Bus"));
            }
        }
        if let Some(station_id) = student.assigned_station_id {
            if !t.stations.contains_key(&station_id) {
                return Err(ApiError::NotFound("Station"));
            }
        }
        let id = t.allocate_id();
        let student = Student {
            id,
            name: student.name,
            username: student.username,
            password_hash: student.password_hash,
            assigned_bus_id: student.assigned_bus_id,
            assigned_station_id: student.assigned_station_id,
        };
        t.students.insert(id, student.clone());
        Ok(student)
    }

    pub async fn students(&self) -> Vec<Student> {
        self.tables.read().await.students.values().cloned().collect()
    }

    pub async fn student_by_username(&self, username: &str) -> Option<Student> {
        let t = self.tables.read().await;
        t.students.values().find(|s| s.username == username).cloned()
    }

    // Admins

    /// Creates the first admin; refused once any admin exists.
    pub async fn create_first_admin(
        &self,
        username: String,
        password_hash: String,
    ) -> Result<Admin, ApiError> {
        let mut t = self.tables.write().await;
        if !t.admins.is_empty() {
            return Err(ApiError::Forbidden("Admin already exists"));
        }
        let id = t.allocate_id();
        let admin = Admin {
            id,
            username,
            password_hash,
        };
        t.admins.insert(id, admin.clone());
        Ok(admin)
    }

    pub async fn admin_by_username(&self, username: &str) -> Option<Admin> {
        let t = self.tables.read().await;
        t.admins.values().find(|a| a.username == username).cloned()
    }

    // Locations

    pub async fn record_location(
        &self,
        location: BusLocationCreate,
        now: DateTime<Utc>,
    ) -> Result<BusLocation, ApiError> {
        let mut t = self.tables.write().await;
        if !t.buses.contains_key(&location.bus_id) {
            return Err(ApiError::NotFound("Bus"));
        }
        let id = t.allocate_id();
        let record = BusLocation {
            id,
            bus_id: location.bus_id,
            latitude: location.latitude,
            longitude: location.longitude,
            timestamp: location.timestamp.unwrap_or(now),
        };
        t.locations.push(record.clone());
        Ok(record)
    }

    /// Most recent fix by timestamp; among equal timestamps the last recorded wins.
    pub async fn latest_location(&self, bus_id: i64) -> Option<BusLocation> {
        let t = self.tables.read().await;
        latest_in(&t, bus_id)
    }

    /// Newest first, at most `limit` entries.
    pub async fn location_history(&self, bus_id: i64, limit: usize) -> Vec<BusLocation> {
        let t = self.tables.read().await;
        let mut history: Vec<BusLocation> = t
            .locations
            .iter()
            .filter(|l| l.bus_id == bus_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        history.truncate(limit);
        history
    }

    /// Stations and latest fix of a bus, read under one lock.
    pub async fn route_snapshot(&self, bus_id: i64) -> RouteSnapshot {
        let t = self.tables.read().await;
        RouteSnapshot {
            stations: sorted_route(&t, bus_id),
            latest: latest_in(&t, bus_id),
        }
    }
}

fn sorted_route(t: &Tables, bus_id: i64) -> Vec<Station> {
    let mut stations: Vec<Station> = t
        .stations
        .values()
        .filter(|s| s.bus_id == bus_id)
        .cloned()
        .collect();
    stations.sort_by_key(|s| s.order_number);
    stations
}

fn latest_in(t: &Tables, bus_id: i64) -> Option<BusLocation> {
    t.locations
        .iter()
        .filter(|l| l.bus_id == bus_id)
        .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bus(number: &str) -> BusCreate {
        BusCreate {
            bus_number: number.into(),
            driver_name: "Driver".into(),
            driver_phone: "555-0100".into(),
        }
    }

    fn fix(bus_id: i64, latitude: f64, timestamp: Option<DateTime<Utc>>) -> BusLocationCreate {
        BusLocationCreate {
            bus_id,
            latitude,
            longitude: 0.0,
            timestamp,
        }
    }

    #[tokio::test]
    async fn duplicate_bus_number_conflicts() {
        let store = Store::new();
        store.create_bus(bus("7")).await.unwrap();
        let err = store.create_bus(bus("7")).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(store.buses().await.len(), 1);
    }

    #[tokio::test]
    async fn station_requires_existing_bus() {
        let store = Store::new();
        let err = store
            .create_station(StationCreate {
                name: "Nowhere".into(),
                latitude: 0.0,
                longitude: 0.0,
                bus_id: 42,
                order_number: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Bus")));
    }

    #[tokio::test]
    async fn stations_come_back_in_route_order() {
        let store = Store::new();
        let b = store.create_bus(bus("1")).await.unwrap();
        for order in [3, 1, 2] {
            store
                .create_station(StationCreate {
                    name: format!("S{}", order),
                    latitude: 0.0,
                    longitude: order as f64,
                    bus_id: b.id,
                    order_number: order,
                })
                .await
                .unwrap();
        }
        let orders: Vec<i64> = store
            .stations_for_bus(b.id)
            .await
            .iter()
            .map(|s| s.order_number)
            .collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn latest_location_uses_timestamp() {
        let store = Store::new();
        let b = store.create_bus(bus("1")).await.unwrap();
        let now = Utc::now();
        store.record_location(fix(b.id, 1.0, None), now).await.unwrap();
        // backfilled, older fix arrives later
        store
            .record_location(fix(b.id, 2.0, Some(now - Duration::minutes(5))), now)
            .await
            .unwrap();
        assert_eq!(store.latest_location(b.id).await.unwrap().latitude, 1.0);

        store.record_location(fix(b.id, 3.0, Some(now)), now).await.unwrap();
        assert_eq!(store.latest_location(b.id).await.unwrap().latitude, 3.0);

        let history = store.location_history(b.id, 2).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].latitude, 3.0);
        assert_eq!(history[1].latitude, 1.0);
    }

    #[tokio::test]
    async fn location_for_unknown_bus_is_rejected() {
        let store = Store::new();
        let err = store
            .record_location(fix(9, 0.0, None), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Bus")));
    }

    #[tokio::test]
    async fn only_one_admin_can_bootstrap() {
        let store = Store::new();
        store
            .create_first_admin("root".into(), "hash".into())
            .await
            .unwrap();
        let err = store
            .create_first_admin("other".into(), "hash".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}
