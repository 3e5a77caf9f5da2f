pub mod auth;
pub mod error;
pub mod eta;
pub mod models;
pub mod routes;
pub mod seed;
pub mod settings;
pub mod store;

use std::sync::Arc;

use settings::Settings;
use store::Store;

pub struct AppState {
    pub store: Store,
    pub settings: Settings,
}

impl AppState {
    pub fn new(settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            store: Store::new(),
            settings,
        })
    }
}

pub use routes::app;
