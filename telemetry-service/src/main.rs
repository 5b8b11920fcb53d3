use std::sync::Arc;

use anyhow::Result;
use telemetry_service::{
    api::{self, AppState},
    collaborators::{AccessControl, AllowAll, HttpAccessControl, HttpProvisioner},
    config::AppConfig,
    metrics_server, observability,
    service::DataService,
    store::{InfluxStore, TimeSeriesStore},
};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let store = InfluxStore::new(&cfg.influxdb)?;
    store
        .health()
        .await
        .map_err(|e| anyhow::anyhow!("InfluxDB at {} is not healthy: {e}", cfg.influxdb.url))?;
    tracing::info!(url = %cfg.influxdb.url, org = %cfg.influxdb.org, "connected to InfluxDB");

    let service = DataService::new(Arc::new(store), cfg.server.default_location.clone());

    let access: Arc<dyn AccessControl> = match cfg.auth.api_url.as_deref() {
        Some(url) if cfg.auth.enabled => Arc::new(HttpAccessControl::new(url, cfg.auth.request_timeout_ms)?),
        _ => {
            tracing::warn!("authorization disabled, every request is allowed");
            Arc::new(AllowAll)
        }
    };
    let provisioner = Arc::new(HttpProvisioner::new(cfg.auth.api_url.clone(), cfg.auth.request_timeout_ms)?);

    let state = AppState {
        service,
        access,
        provisioner,
    };
    let app = api::router(state, cfg.server.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {e}", cfg.server.bind_addr))?;
    tracing::info!(addr = %cfg.server.bind_addr, "telemetry service listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("telemetry service stopped");
    Ok(())
}
