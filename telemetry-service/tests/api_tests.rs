//! HTTP API tests driving the router against the in-memory store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use telemetry_service::{
    api::{self, AppState},
    collaborators::{AccessCheck, AccessControl, AllowAll, AuthError, Provisioner, ProvisioningResponse},
    service::DataService,
    store::InMemoryStore,
    ServiceError,
};
use tower::ServiceExt;

struct DenyAll;

#[async_trait::async_trait]
impl AccessControl for DenyAll {
    async fn check(&self, check: AccessCheck, id: &str, _authorization: Option<&str>) -> Result<(), AuthError> {
        Err(AuthError::Denied { check, id: id.to_string() })
    }
}

struct FixedToken(&'static str);

#[async_trait::async_trait]
impl Provisioner for FixedToken {
    async fn provisioning_token(
        &self,
        _device_id: &str,
        _authorization: Option<&str>,
    ) -> Result<ProvisioningResponse, ServiceError> {
        if self.0.is_empty() {
            return Err(ServiceError::Internal("provisioning service returned an empty token".into()));
        }
        Ok(ProvisioningResponse {
            provisioning_token: self.0.to_string(),
        })
    }
}

fn app_with(store: &InMemoryStore, access: Arc<dyn AccessControl>) -> Router {
    let state = AppState {
        service: DataService::new(Arc::new(store.clone()), "default_location"),
        access,
        provisioner: Arc::new(FixedToken("prov-123")),
    };
    api::router(state, 1024 * 1024)
}

fn app(store: &InMemoryStore) -> Router {
    app_with(store, Arc::new(AllowAll))
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()));
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer test")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, "Bearer test")
        .body(Body::empty())
        .unwrap()
}

const SENSOR_RANGE: &str =
    "time_range_start=2024-05-01T10:00:00Z&time_range_stop=2024-05-01T10:03:00Z&window_period=1m";

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = send(&app(&InMemoryStore::new()), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
}

#[tokio::test]
async fn sensor_ingest_then_query_returns_windowed_means_with_nulls() {
    let store = InMemoryStore::new();
    let router = app(&store);

    let (status, body) = send(
        &router,
        post_json(
            "/influxdb/sensordata/stm32-1/12",
            json!([
                {"device_id": "stm32-1", "component_id": "c-1", "field": "temperature", "value": 20.0,
                 "timestamp": "2024-05-01T10:00:10Z"},
                {"device_id": "stm32-1", "component_id": "c-1", "field": "temperature", "value": 22.0,
                 "timestamp": "2024-05-01T10:00:50Z"},
                {"device_id": "stm32-1", "component_id": "c-2", "field": "humidity", "value": 0.0,
                 "timestamp": "2024-05-01T10:02:30Z"}
            ]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["message"].is_string());
    assert_eq!(store.points("12").len(), 3);

    let uri = format!(
        "/influxdb/sensordata/stm32-1/12?sensor_type=temperature&sensor_type=humidity&{SENSOR_RANGE}"
    );
    let (status, body) = send(&router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);

    let devices = body.as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["deviceId"], "stm32-1");

    let temps = devices[0]["readings"]["temperature"].as_array().unwrap();
    assert_eq!(temps.len(), 3);
    assert_eq!(temps[0]["time"], "2024-05-01T10:01:00Z");
    assert_eq!(temps[0]["value"], 21.0);
    assert!(temps[1]["value"].is_null());

    let humidity = devices[0]["readings"]["humidity"].as_array().unwrap();
    assert!(humidity[0]["value"].is_null());
    assert_eq!(humidity[2]["value"], 0.0);
}

#[tokio::test]
async fn query_for_location_without_bucket_is_empty_array() {
    let router = app(&InMemoryStore::new());
    let uri = format!("/influxdb/sensordata/stm32-1/unknown?sensor_type=temperature&{SENSOR_RANGE}");
    let (status, body) = send(&router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn validation_failures_are_structured_bad_requests() {
    let store = InMemoryStore::new().with_bucket("12");
    let router = app(&store);

    let cases = [
        (
            "sensor_type=temperature&time_range_start=2024-05-01T10:00:00Z&time_range_stop=2024-05-01T11:00:00Z&window_period=1ms",
            "query_too_broad",
        ),
        (
            "sensor_type=temperature&time_range_start=2024-05-01T10:00:00Z&time_range_stop=2024-05-01T10:00:00Z&window_period=1m",
            "invalid_time_range",
        ),
        (
            "sensor_type=temperature&time_range_start=2024-05-01T10:05:00Z&time_range_stop=2024-05-01T10:00:00Z&window_period=1m",
            "invalid_time_range",
        ),
        ("sensor_type=temperature&window_period=1m", "missing_parameter"),
        (
            "sensor_type=temperature&time_range_start=yesterday&time_range_stop=2024-05-01T10:00:00Z&window_period=1m",
            "invalid_format",
        ),
        (
            "sensor_type=temp%22%20or%20true&time_range_start=2024-05-01T10:00:00Z&time_range_stop=2024-05-01T10:03:00Z&window_period=1m",
            "invalid_format",
        ),
    ];

    for (query, code) in cases {
        let (status, body) = send(&router, get(&format!("/influxdb/sensordata/stm32-1/12?{query}"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{query}");
        assert_eq!(body["code"], code, "{query}");
        assert!(body["message"].is_string());
    }
    assert_eq!(store.query_calls(), 0);
}

#[tokio::test]
async fn denied_access_is_forbidden_and_writes_nothing() {
    let store = InMemoryStore::new();
    let router = app_with(&store, Arc::new(DenyAll));

    let (status, body) = send(
        &router,
        post_json(
            "/influxdb/sensordata/stm32-1/12",
            json!([{"device_id": "stm32-1", "field": "temperature", "value": 1.0}]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
    assert_eq!(store.write_calls(), 0);
    assert_eq!(store.create_calls(), 0);
}

#[tokio::test]
async fn malformed_body_and_missing_device_are_bad_requests() {
    let store = InMemoryStore::new();
    let router = app(&store);

    let (status, body) = send(&router, post_json("/influxdb/sensordata/stm32-1/12", json!({"not": "a list"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_format");

    let (status, body) = send(
        &router,
        post_json(
            "/influxdb/sensordata/stm32-1/12",
            json!([{"device_id": "", "field": "temperature", "value": 1.0}]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_parameter");
    assert_eq!(store.write_calls(), 0);
}

#[tokio::test]
async fn unparseable_sample_timestamp_still_created() {
    let store = InMemoryStore::new();
    let router = app(&store);

    let (status, _) = send(
        &router,
        post_json(
            "/influxdb/sensordata/stm32-1/12",
            json!([{"device_id": "stm32-1", "field": "light", "value": 300.0, "timestamp": "not-a-time"}]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(store.points("12").len(), 1);
}

#[tokio::test]
async fn empty_sensor_batch_is_created_without_writes() {
    let store = InMemoryStore::new();
    let (status, body) = send(&app(&store), post_json("/influxdb/sensordata/stm32-1/12", json!([]))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["message"].is_string());
    assert_eq!(store.write_calls(), 0);
    assert_eq!(store.create_calls(), 0);
}

#[tokio::test]
async fn devices_of_a_location_are_listed_once_each() {
    let store = InMemoryStore::new();
    let router = app(&store);

    let (status, _) = send(
        &router,
        post_json(
            "/influxdb/sensordata/stm32-1/12",
            json!([
                {"device_id": "stm32-1", "field": "temperature", "value": 20.0, "timestamp": "2024-05-01T10:00:10Z"},
                {"device_id": "stm32-1", "field": "humidity", "value": 40.0, "timestamp": "2024-05-01T10:00:20Z"}
            ]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&router, get("/influxdb/locations/12/devices")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["stm32-1"]));

    let (status, body) = send(&router, get("/influxdb/locations/99/devices")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn device_listing_requires_location_access() {
    let store = InMemoryStore::new();
    let (status, body) = send(&app_with(&store, Arc::new(DenyAll)), get("/influxdb/locations/12/devices")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
    assert_eq!(store.query_calls(), 0);
}

#[tokio::test]
async fn consumption_round_trip_is_wrapped_in_array() {
    let store = InMemoryStore::new();
    let router = app(&store);

    let (status, _) = send(
        &router,
        post_json(
            "/influxdb/metrics/meter-1",
            json!({"device_id": "meter-1", "current": 2.0, "voltage": 230.0, "power": 460.0,
                   "timestamp": "2024-05-01T10:00:10Z"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &router,
        get("/influxdb/metrics/meter-1?time_range_start=2024-05-01T10:00:00Z&time_range_stop=2024-05-01T10:01:00Z&window_period=1m"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let responses = body.as_array().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["device_id"], "meter-1");
    for metric in ["current", "voltage", "power"] {
        assert!(responses[0]["readings"][metric].is_array(), "{metric}");
    }
    assert_eq!(responses[0]["readings"]["power"][0]["value"], 460.0);
}

#[tokio::test]
async fn consumption_without_timestamp_is_rejected() {
    let store = InMemoryStore::new();
    let (status, body) = send(
        &app(&store),
        post_json(
            "/influxdb/metrics/meter-1",
            json!({"device_id": "meter-1", "current": 2.0, "voltage": 230.0, "power": 460.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_parameter");
    assert_eq!(store.write_calls(), 0);
}

#[tokio::test]
async fn locations_exclude_system_and_consumption_buckets() {
    let store = InMemoryStore::new()
        .with_bucket("_monitoring")
        .with_bucket("consumption_data")
        .with_bucket("12");
    let (status, body) = send(&app(&store), get("/influxdb/locations")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["12"]));
}

#[tokio::test]
async fn provisioning_returns_token() {
    let (status, body) = send(&app(&InMemoryStore::new()), get("/influxdb/provisioning/stm32-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provisioning_token"], "prov-123");
}

#[tokio::test]
async fn cors_preflight_allows_any_origin() {
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/influxdb/locations")
        .header(header::ORIGIN, "http://dashboard.local")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let response = app(&InMemoryStore::new()).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}
