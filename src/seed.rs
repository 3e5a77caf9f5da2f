use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Deserialize;

use crate::error::SeedError;
use crate::models::{validate_coordinates, BusCreate, StationCreate};
use crate::store::Store;

/// One row of the station seed file. Buses are keyed by `bus_number`.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedStation {
    pub bus_number: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub order_number: i64,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub buses_created: usize,
    pub stations_created: usize,
}

/// Reads a seed CSV, gunzipping it first when the path ends in `.gz`.
pub fn load_stations(path: &Path) -> Result<Vec<SeedStation>, SeedError> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    parse_stations(reader)
}

pub fn parse_stations<R: Read>(reader: R) -> Result<Vec<SeedStation>, SeedError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for (idx, result) in rdr.deserialize().enumerate() {
        let row: SeedStation = result?;
        // header is line 1
        validate_coordinates(row.latitude, row.longitude).map_err(|e| SeedError::InvalidRow {
            row: idx + 2,
            reason: e.to_string(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Inserts seed rows, creating each bus the first time its number appears.
pub async fn apply(store: &Store, rows: Vec<SeedStation>) -> Result<SeedSummary, SeedError> {
    let mut summary = SeedSummary::default();
    for (idx, row) in rows.into_iter().enumerate() {
        let invalid = |e: crate::error::ApiError| SeedError::InvalidRow {
            row: idx + 2,
            reason: e.to_string(),
        };
        let bus = match store.bus_by_number(&row.bus_number).await {
            Some(bus) => bus,
            None => {
                summary.buses_created += 1;
                store
                    .create_bus(BusCreate {
                        bus_number: row.bus_number.clone(),
                        driver_name: row.driver_name.clone(),
                        driver_phone: row.driver_phone.clone(),
                    })
                    .await
                    .map_err(invalid)?
            }
        };
        store
            .create_station(StationCreate {
                name: row.name,
                latitude: row.latitude,
                longitude: row.longitude,
                bus_id: bus.id,
                order_number: row.order_number,
            })
            .await
            .map_err(invalid)?;
        summary.stations_created += 1;
    }
    tracing::info!(
        buses = summary.buses_created,
        stations = summary.stations_created,
        "seeded stations"
    );
    Ok(summary)
}
