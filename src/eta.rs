//! Station status and ETA estimation.
//!
//! Works purely on in-memory snapshots: a bus's latest fix, a target station
//! and the stations of the bus's route. The bus's progress along the route is
//! inferred from the station nearest to its fix, so two stations at the same
//! distance are resolved by input order. That is an approximation of real bus
//! progress, not a model of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 30.0;
pub const DEFAULT_APPROACHING_DISTANCE_KM: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: i64,
    pub position: GeoPoint,
    pub bus_id: i64,
    pub order_index: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusFix {
    pub bus_id: i64,
    pub position: GeoPoint,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    Passed,
    Approaching,
    Waiting,
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationStatus::Passed => "passed",
            StationStatus::Approaching => "approaching",
            StationStatus::Waiting => "waiting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StationEstimate {
    pub status: StationStatus,
    pub eta_minutes: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaConfig {
    pub average_speed_kmh: f64,
    pub approaching_distance_km: f64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            average_speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
            approaching_distance_km: DEFAULT_APPROACHING_DISTANCE_KM,
        }
    }
}

impl EtaConfig {
    /// Speed must be finite and positive, the threshold finite and not negative.
    pub fn validate(&self) -> Result<(), String> {
        if !self.average_speed_kmh.is_finite() || self.average_speed_kmh <= 0.0 {
            return Err(format!(
                "average bus speed must be a positive number of km/h, got {}",
                self.average_speed_kmh
            ));
        }
        if !self.approaching_distance_km.is_finite() || self.approaching_distance_km < 0.0 {
            return Err(format!(
                "approaching distance must be a non-negative number of km, got {}",
                self.approaching_distance_km
            ));
        }
        Ok(())
    }

    /// Minutes to cover `distance_km` at the configured average speed.
    /// Halves round to even.
    pub fn eta_minutes(&self, distance_km: f64) -> u32 {
        if distance_km <= 0.0 {
            return 0;
        }
        let minutes = distance_km / self.average_speed_kmh * 60.0;
        minutes.round_ties_even() as u32
    }
}

/// Haversine distance between two GPS coordinates, in km.
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_KM * c
}

fn closest_index<'a>(fix: &BusFix, route: impl IntoIterator<Item = &'a Station>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, station) in route.into_iter().enumerate() {
        let d = distance(fix.position, station.position);
        // strict comparison keeps the first of equally distant stations
        match best {
            Some((_, min)) if d >= min => {}
            _ => best = Some((idx, d)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Station of `route` nearest to the fix, first one wins on ties.
pub fn closest_station<'a>(fix: &BusFix, route: &'a [Station]) -> Option<&'a Station> {
    closest_index(fix, route).map(|idx| &route[idx])
}

/// Classifies `target` relative to the bus and estimates its arrival time.
pub fn station_status(
    config: &EtaConfig,
    fix: Option<&BusFix>,
    target: &Station,
    route: &[Station],
) -> StationEstimate {
    let Some(fix) = fix else {
        return StationEstimate {
            status: StationStatus::Waiting,
            eta_minutes: None,
        };
    };

    if let Some(current) = closest_station(fix, route) {
        if current.order_index > target.order_index {
            return StationEstimate {
                status: StationStatus::Passed,
                eta_minutes: Some(0),
            };
        }
    }

    let direct = distance(fix.position, target.position);
    if direct <= config.approaching_distance_km {
        return StationEstimate {
            status: StationStatus::Approaching,
            eta_minutes: Some(config.eta_minutes(direct)),
        };
    }

    let remaining = route_distance(fix, target, route);
    StationEstimate {
        status: StationStatus::Waiting,
        eta_minutes: Some(config.eta_minutes(remaining)),
    }
}

/// Remaining travel distance along the route polyline, in km.
///
/// Runs from the fix to its nearest station, then station to station up to
/// `target`. A target missing from `route` sums every segment to the end.
pub fn route_distance(fix: &BusFix, target: &Station, route: &[Station]) -> f64 {
    let mut sorted: Vec<&Station> = route.iter().collect();
    sorted.sort_by_key(|s| s.order_index);

    let Some(current_idx) = closest_index(fix, sorted.iter().copied()) else {
        return distance(fix.position, target.position);
    };
    let current = sorted[current_idx];

    if target.order_index <= current.order_index {
        return 0.0;
    }

    let target_idx = sorted
        .iter()
        .position(|s| s.id == target.id)
        .unwrap_or(sorted.len());
    let end = target_idx.min(sorted.len() - 1);

    let segments: f64 = sorted[current_idx..=end.max(current_idx)]
        .windows(2)
        .map(|pair| distance(pair[0].position, pair[1].position))
        .sum();

    distance(fix.position, current.position) + segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn station(id: i64, order_index: i64, latitude: f64, longitude: f64) -> Station {
        Station {
            id,
            position: GeoPoint::new(latitude, longitude),
            bus_id: 1,
            order_index,
        }
    }

    fn fix_at(latitude: f64, longitude: f64) -> BusFix {
        BusFix {
            bus_id: 1,
            position: GeoPoint::new(latitude, longitude),
            timestamp: Utc::now(),
        }
    }

    fn line_route() -> Vec<Station> {
        vec![
            station(1, 1, 10.0, 10.0),
            station(2, 2, 10.0, 11.0),
            station(3, 3, 10.0, 12.0),
        ]
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = GeoPoint::new(42.3601, -71.0589);
        assert_eq!(distance(p, p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let boston = GeoPoint::new(42.3601, -71.0589);
        let nyc = GeoPoint::new(40.7128, -74.0060);
        assert_abs_diff_eq!(distance(boston, nyc), distance(nyc, boston), epsilon = 1e-9);
    }

    #[test]
    fn boston_to_nyc() {
        let boston = GeoPoint::new(42.3601, -71.0589);
        let nyc = GeoPoint::new(40.7128, -74.0060);
        assert_abs_diff_eq!(distance(boston, nyc), 306.0, epsilon = 2.0);
    }

    #[test]
    fn eta_rounds_at_configured_speed() {
        let config = EtaConfig::default();
        assert_eq!(config.eta_minutes(0.0), 0);
        assert_eq!(config.eta_minutes(-3.0), 0);
        assert_eq!(config.eta_minutes(15.0), 30);
        // 0.25 km at 30 km/h is exactly half a minute
        assert_eq!(config.eta_minutes(0.25), 0);
        assert_eq!(config.eta_minutes(1.0), 2);

        let mut last = 0;
        for step in 0..200 {
            let eta = config.eta_minutes(step as f64 * 0.1);
            assert!(eta >= last);
            last = eta;
        }
    }

    #[test]
    fn config_rejects_unusable_speed_and_threshold() {
        assert!(EtaConfig::default().validate().is_ok());
        let zero_radius = EtaConfig {
            approaching_distance_km: 0.0,
            ..EtaConfig::default()
        };
        assert!(zero_radius.validate().is_ok());

        for speed in [0.0, -30.0, f64::NAN, f64::INFINITY] {
            let config = EtaConfig {
                average_speed_kmh: speed,
                ..EtaConfig::default()
            };
            assert!(config.validate().is_err(), "speed {} accepted", speed);
        }
        for threshold in [-1.0, f64::NAN, f64::INFINITY] {
            let config = EtaConfig {
                approaching_distance_km: threshold,
                ..EtaConfig::default()
            };
            assert!(config.validate().is_err(), "threshold {} accepted", threshold);
        }
    }

    #[test]
    fn closest_station_on_empty_route() {
        assert!(closest_station(&fix_at(10.0, 10.0), &[]).is_none());
    }

    #[test]
    fn closest_station_ties_keep_input_order() {
        let route = vec![station(7, 2, 10.0, 11.0), station(8, 1, 10.0, 9.0)];
        let found = closest_station(&fix_at(10.0, 10.0), &route).unwrap();
        assert_eq!(found.id, 7);

        let reversed: Vec<Station> = route.into_iter().rev().collect();
        let found = closest_station(&fix_at(10.0, 10.0), &reversed).unwrap();
        assert_eq!(found.id, 8);
    }

    #[test]
    fn no_fix_means_waiting_without_eta() {
        let route = line_route();
        let estimate = station_status(&EtaConfig::default(), None, &route[1], &route);
        assert_eq!(estimate.status, StationStatus::Waiting);
        assert_eq!(estimate.eta_minutes, None);
    }

    #[test]
    fn station_behind_the_bus_is_passed() {
        let a = station(1, 1, 10.0, 10.0);
        let b = station(2, 2, 10.0, 11.0);
        let route = vec![a.clone(), b];
        let estimate = station_status(&EtaConfig::default(), Some(&fix_at(10.0, 11.0)), &a, &route);
        assert_eq!(estimate.status, StationStatus::Passed);
        assert_eq!(estimate.eta_minutes, Some(0));
    }

    #[test]
    fn nearby_station_is_approaching() {
        let route = line_route();
        let fix = fix_at(10.0, 10.005);
        let estimate = station_status(&EtaConfig::default(), Some(&fix), &route[0], &route);
        assert_eq!(estimate.status, StationStatus::Approaching);
        assert_eq!(estimate.eta_minutes, Some(1));
    }

    #[test]
    fn current_station_is_not_passed() {
        // fix is nearest to station 2 but farther than the approaching radius
        let route = line_route();
        let config = EtaConfig {
            approaching_distance_km: 0.5,
            ..EtaConfig::default()
        };
        let fix = fix_at(10.0, 10.99);
        let estimate = station_status(&config, Some(&fix), &route[1], &route);
        assert_eq!(estimate.status, StationStatus::Waiting);
        assert_eq!(estimate.eta_minutes, Some(0));
    }

    #[test]
    fn far_station_follows_the_route() {
        let route = line_route();
        let fix = fix_at(10.0, 10.01);
        let config = EtaConfig::default();

        let expected = distance(fix.position, route[0].position)
            + distance(route[0].position, route[1].position)
            + distance(route[1].position, route[2].position);
        let remaining = route_distance(&fix, &route[2], &route);
        assert_abs_diff_eq!(remaining, expected, epsilon = 1e-9);
        assert!(remaining > distance(fix.position, route[2].position));

        let estimate = station_status(&config, Some(&fix), &route[2], &route);
        assert_eq!(estimate.status, StationStatus::Waiting);
        assert_eq!(estimate.eta_minutes, Some(config.eta_minutes(expected)));
        assert!(estimate.eta_minutes.unwrap() > 0);
    }

    #[test]
    fn route_distance_sorts_by_order_index() {
        let mut route = line_route();
        route.reverse();
        let fix = fix_at(10.0, 10.01);
        let target = route[0].clone();
        let sorted = line_route();
        let expected = distance(fix.position, sorted[0].position)
            + distance(sorted[0].position, sorted[1].position)
            + distance(sorted[1].position, sorted[2].position);
        assert_abs_diff_eq!(route_distance(&fix, &target, &route), expected, epsilon = 1e-9);
        // caller's order is untouched
        assert_eq!(route[0].id, 3);
    }

    #[test]
    fn route_distance_on_empty_route_is_direct() {
        let target = station(1, 1, 10.0, 12.0);
        let fix = fix_at(10.0, 10.0);
        assert_abs_diff_eq!(
            route_distance(&fix, &target, &[]),
            distance(fix.position, target.position),
            epsilon = 1e-9
        );
    }

    #[test]
    fn route_distance_for_reached_target_is_zero() {
        let route = line_route();
        let fix = fix_at(10.0, 11.0);
        assert_eq!(route_distance(&fix, &route[0], &route), 0.0);
        assert_eq!(route_distance(&fix, &route[1], &route), 0.0);
    }

    #[test]
    fn target_off_route_runs_to_the_end() {
        let route = line_route();
        let fix = fix_at(10.0, 10.01);
        let stray = station(99, 10, 10.0, 20.0);
        let expected = distance(fix.position, route[0].position)
            + distance(route[0].position, route[1].position)
            + distance(route[1].position, route[2].position);
        assert_abs_diff_eq!(route_distance(&fix, &stray, &route), expected, epsilon = 1e-9);
    }
}
