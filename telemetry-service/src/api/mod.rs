//! HTTP surface: ingest and query routes over [`DataService`], guarded by
//! the authorization collaborator.

pub mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    collaborators::{AccessControl, Provisioner},
    service::DataService,
};

#[derive(Clone)]
pub struct AppState {
    pub service: DataService,
    pub access: Arc<dyn AccessControl>,
    pub provisioner: Arc<dyn Provisioner>,
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/influxdb/sensordata/:device_id/:location_id",
            get(handlers::query_sensor).post(handlers::ingest_sensor),
        )
        .route(
            "/influxdb/metrics/:device_id",
            get(handlers::query_consumption).post(handlers::ingest_consumption),
        )
        .route("/influxdb/locations", get(handlers::list_locations))
        .route("/influxdb/locations/:location_id/devices", get(handlers::list_devices))
        .route("/influxdb/provisioning/:device_id", get(handlers::provisioning))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}
