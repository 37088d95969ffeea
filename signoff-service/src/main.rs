use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod api;
mod artifacts;
mod backend;
mod compositing;
mod config;
mod error;
mod retry;
mod service;

use crate::backend::BackendClient;
use crate::config::AppConfig;
use crate::service::SignoffService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting signoff service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = AppConfig::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        backend = %config.backend.base_url,
        "Configuration loaded"
    );

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed, metrics disabled");
            None
        }
    };

    let backend = Arc::new(BackendClient::new(&config.backend)?);
    let service = Arc::new(SignoffService::new(backend, &config));

    let app = api::router(service, metrics);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("signoff_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
