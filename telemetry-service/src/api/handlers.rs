use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use telemetry_client::domain::{
    ConsumptionQuery, ConsumptionQueryResponse, ConsumptionSample, SensorQuery, SensorQueryResponse, SensorSample,
};

use super::AppState;
use crate::{
    collaborators::{AccessCheck, ProvisioningResponse},
    error::ServiceError,
};

type Params = Vec<(String, String)>;

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
}

fn first(params: &Params, key: &str) -> Option<String> {
    params
        .iter()
        .find(|(k, v)| k == key && !v.trim().is_empty())
        .map(|(_, v)| v.trim().to_string())
}

/// Every non-empty value of a repeatable parameter; comma-separated lists
/// are accepted too.
fn all(params: &Params, key: &str) -> Vec<String> {
    params
        .iter()
        .filter(|(k, _)| k == key)
        .flat_map(|(_, v)| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn created(message: String) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(json!({ "message": message })))
}

/// Writing for a device other than the authorized one is refused. An empty
/// id is left for validation to reject.
fn check_same_device(path_device: &str, body_device: &str) -> Result<(), ServiceError> {
    if body_device.trim().is_empty() {
        return Ok(());
    }
    if body_device.trim() != path_device {
        return Err(ServiceError::PermissionDenied(format!(
            "sample for device '{}' sent to device '{path_device}'",
            body_device.trim()
        )));
    }
    Ok(())
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn ingest_sensor(
    State(state): State<AppState>,
    Path((device_id, location_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Json<Vec<SensorSample>>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ServiceError> {
    state
        .access
        .check(AccessCheck::DeviceRights, &device_id, bearer(&headers))
        .await?;

    let Json(mut samples) = body?;

    for s in &mut samples {
        check_same_device(&device_id, &s.device_id)?;
        if s.location_id.trim().is_empty() {
            s.location_id = location_id.clone();
        }
    }

    let count = state.service.ingest_sensor_samples(&samples).await?;
    Ok(created(format!("{count} sensor sample(s) written")))
}

pub async fn query_sensor(
    State(state): State<AppState>,
    Path((device_id, location_id)): Path<(String, String)>,
    Query(params): Query<Params>,
    headers: HeaderMap,
) -> Result<Json<Vec<SensorQueryResponse>>, ServiceError> {
    let req = SensorQuery {
        location_id: first(&params, "location_id").unwrap_or(location_id),
        device_id: first(&params, "device_id").unwrap_or(device_id),
        sensor_types: all(&params, "sensor_type"),
        time_range_start: first(&params, "time_range_start").unwrap_or_default(),
        time_range_stop: first(&params, "time_range_stop").unwrap_or_default(),
        window_period: first(&params, "window_period").unwrap_or_default(),
    };

    let token = bearer(&headers);
    state.access.check(AccessCheck::Device, &req.device_id, token).await?;
    state.access.check(AccessCheck::Location, &req.location_id, token).await?;

    Ok(Json(state.service.query_sensor(&req).await?))
}

pub async fn ingest_consumption(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<ConsumptionSample>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ServiceError> {
    state
        .access
        .check(AccessCheck::DeviceRights, &device_id, bearer(&headers))
        .await?;

    let Json(sample) = body?;
    check_same_device(&device_id, &sample.device_id)?;

    state.service.ingest_consumption(&sample).await?;
    Ok(created("consumption sample written".to_string()))
}

pub async fn query_consumption(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(params): Query<Params>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConsumptionQueryResponse>>, ServiceError> {
    let req = ConsumptionQuery {
        device_id: first(&params, "device_id").unwrap_or(device_id),
        metrics: all(&params, "metric"),
        time_range_start: first(&params, "time_range_start").unwrap_or_default(),
        time_range_stop: first(&params, "time_range_stop").unwrap_or_default(),
        window_period: first(&params, "window_period").unwrap_or_default(),
    };

    state
        .access
        .check(AccessCheck::Device, &req.device_id, bearer(&headers))
        .await?;

    let response = state.service.query_consumption(&req).await?;
    Ok(Json(vec![response]))
}

pub async fn list_locations(State(state): State<AppState>) -> Result<Json<Vec<String>>, ServiceError> {
    Ok(Json(state.service.list_locations().await?))
}

pub async fn list_devices(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, ServiceError> {
    state
        .access
        .check(AccessCheck::Location, &location_id, bearer(&headers))
        .await?;
    Ok(Json(state.service.list_devices(&location_id).await?))
}

pub async fn provisioning(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProvisioningResponse>, ServiceError> {
    let resp = state
        .provisioner
        .provisioning_token(&device_id, bearer(&headers))
        .await?;
    Ok(Json(resp))
}
