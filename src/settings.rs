use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::eta::{EtaConfig, DEFAULT_APPROACHING_DISTANCE_KM, DEFAULT_AVERAGE_SPEED_KMH};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_SECRET_KEY: &str = "change-me-in-production";
pub const DEFAULT_TOKEN_EXPIRE_MINUTES: i64 = 30;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    pub bcrypt_cost: u32,
    pub average_bus_speed_kmh: f64,
    pub approaching_distance_km: f64,
    pub gui_enabled: bool,
    pub seed_stations_path: Option<PathBuf>,
}

impl Settings {
    /// Defaults, then `Settings.toml` if present, then `SCHOOL_BUS_*` variables.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(
            Self::defaults()?
                .add_source(File::with_name("Settings").required(false))
                .add_source(Environment::with_prefix("SCHOOL_BUS").try_parsing(true)),
        )
    }

    fn load(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings
            .eta_config()
            .validate()
            .map_err(ConfigError::Message)?;
        Ok(settings)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("bind_addr", DEFAULT_BIND_ADDR)?
            .set_default("secret_key", DEFAULT_SECRET_KEY)?
            .set_default("access_token_expire_minutes", DEFAULT_TOKEN_EXPIRE_MINUTES)?
            .set_default("bcrypt_cost", i64::from(bcrypt::DEFAULT_COST))?
            .set_default("average_bus_speed_kmh", DEFAULT_AVERAGE_SPEED_KMH)?
            .set_default("approaching_distance_km", DEFAULT_APPROACHING_DISTANCE_KM)?
            .set_default("gui_enabled", true)
    }

    pub fn eta_config(&self) -> EtaConfig {
        EtaConfig {
            average_speed_kmh: self.average_bus_speed_kmh,
            approaching_distance_km: self.approaching_distance_km,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            access_token_expire_minutes: DEFAULT_TOKEN_EXPIRE_MINUTES,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            average_bus_speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
            approaching_distance_km: DEFAULT_APPROACHING_DISTANCE_KM,
            gui_enabled: true,
            seed_stations_path: None,
        }
    }
}
