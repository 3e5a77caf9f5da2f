use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use school_bus::settings::{Settings, DEFAULT_SECRET_KEY};
use school_bus::{app, seed, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("school_bus=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new().context("failed to load settings")?;
    if settings.secret_key == DEFAULT_SECRET_KEY {
        tracing::warn!("using the default secret key, set SCHOOL_BUS_SECRET_KEY in production");
    }

    let state = AppState::new(settings.clone());

    if let Some(path) = &settings.seed_stations_path {
        let rows = seed::load_stations(path)
            .with_context(|| format!("failed to load seed file {}", path.display()))?;
        seed::apply(&state.store, rows).await?;
    }

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;

    tracing::info!("Server is running on http://{}", settings.bind_addr);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("shutting down");
}
