use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use influxdb2::RequestError;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use telemetry_client::query::{DeviceListQuery, WindowedQuery};
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;

use super::{
    annotated_csv::{AnnotatedCsvParser, ColumnParser}, line_protocol::LineProtocol, Point, RowStream, StoreError,
    TimeSeriesStore,
};
use crate::config::InfluxDbConfig;

#[derive(Deserialize)]
struct InfluxErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct BucketList {
    #[serde(default)]
    buckets: Vec<BucketEntry>,
}

#[derive(Deserialize)]
struct BucketEntry {
    name: String,
}

#[derive(Deserialize)]
struct OrgList {
    #[serde(default)]
    orgs: Vec<OrgEntry>,
}

#[derive(Deserialize)]
struct OrgEntry {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct HealthBody {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

fn unavailable(op: &'static str, target: &str, e: reqwest::Error) -> StoreError {
    StoreError::Unavailable {
        op,
        target: target.to_string(),
        message: e.to_string(),
    }
}

/// Prefer the store's JSON `message` over the raw error body.
fn influx_message(text: String) -> String {
    match serde_json::from_str::<InfluxErrorBody>(&text) {
        Ok(body) if !body.message.is_empty() => body.message,
        _ => text,
    }
}

async fn error_message(resp: Response) -> String {
    influx_message(resp.text().await.unwrap_or_default())
}

async fn rejected(op: &'static str, target: &str, resp: Response) -> StoreError {
    let status = resp.status().as_u16();
    StoreError::Rejected {
        op,
        target: target.to_string(),
        status,
        message: error_message(resp).await,
    }
}

/// InfluxDB 2.x adapter.
///
/// Points go through the `influxdb2` client's line-protocol write. Queries
/// and bucket metadata use the HTTP API directly: query results are read
/// as a line stream so rows (including null `_value` cells) reach the
/// caller while the response is still arriving.
///
/// One instance is built at startup and shared; both clients pool
/// connections. Dropping a pending call aborts its HTTP request, so an
/// abandoned client request stops the store query too.
#[derive(Clone)]
pub struct InfluxStore {
    http: reqwest::Client,
    writer: Arc<influxdb2::Client>,
    timeout: Duration,
    base_url: String,
    token: String,
    org: String,
}

impl InfluxStore {
    pub fn new(cfg: &InfluxDbConfig) -> Result<Self, StoreError> {
        let timeout = Duration::from_millis(cfg.request_timeout_ms);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| unavailable("build_client", &cfg.url, e))?;

        let base_url = cfg.url.trim_end_matches('/').to_string();
        let writer = influxdb2::Client::new(base_url.as_str(), cfg.org.as_str(), cfg.token.as_str());

        Ok(Self {
            http,
            writer: Arc::new(writer),
            timeout,
            base_url,
            token: cfg.token.clone(),
            org: cfg.org.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(header::AUTHORIZATION, format!("Token {}", self.token))
    }

    async fn find_org_id(&self) -> Result<String, StoreError> {
        let op = "find_organization";
        let resp = self
            .request(Method::GET, "/api/v2/orgs")
            .query(&[("org", self.org.as_str())])
            .send()
            .await
            .map_err(|e| unavailable(op, &self.org, e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::OrganizationNotFound(self.org.clone()));
        }
        if !resp.status().is_success() {
            return Err(rejected(op, &self.org, resp).await);
        }

        let list: OrgList = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("organization list: {e}")))?;

        list.orgs
            .into_iter()
            .find(|o| o.name == self.org)
            .map(|o| o.id)
            .ok_or_else(|| StoreError::OrganizationNotFound(self.org.clone()))
    }

    /// POST `flux` to the query API, asking for annotated CSV.
    async fn post_query(&self, bucket: &str, flux: String) -> Result<Response, StoreError> {
        let op = "query";
        tracing::debug!(bucket = %bucket, query = %flux, "executing flux query");

        let body = serde_json::json!({
            "query": flux,
            "type": "flux",
            "dialect": {
                "header": true,
                "annotations": ["datatype", "group", "default"],
            },
        });
        let resp = self
            .request(Method::POST, "/api/v2/query")
            .query(&[("org", self.org.as_str())])
            .header(header::ACCEPT, "application/csv")
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable(op, bucket, e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }
        if !resp.status().is_success() {
            return Err(rejected(op, bucket, resp).await);
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl TimeSeriesStore for InfluxStore {
    async fn health(&self) -> Result<(), StoreError> {
        let op = "health";
        let resp = self
            .request(Method::GET, "/health")
            .send()
            .await
            .map_err(|e| unavailable(op, &self.base_url, e))?;

        let body: HealthBody = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("health response: {e}")))?;

        if body.status != "pass" {
            return Err(StoreError::Unavailable {
                op,
                target: self.base_url.clone(),
                message: body.message.unwrap_or(body.status),
            });
        }
        Ok(())
    }

    async fn bucket_exists(&self, name: &str) -> Result<bool, StoreError> {
        let op = "find_bucket";
        let resp = self
            .request(Method::GET, "/api/v2/buckets")
            .query(&[("org", self.org.as_str()), ("name", name)])
            .send()
            .await
            .map_err(|e| unavailable(op, name, e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !resp.status().is_success() {
            return Err(rejected(op, name, resp).await);
        }

        let list: BucketList = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("bucket list: {e}")))?;
        Ok(list.buckets.iter().any(|b| b.name == name))
    }

    async fn create_bucket(&self, name: &str) -> Result<(), StoreError> {
        let op = "create_bucket";
        let org_id = self.find_org_id().await?;

        let body = serde_json::json!({
            "orgID": org_id,
            "name": name,
            "retentionRules": [],
        });
        let resp = self
            .request(Method::POST, "/api/v2/buckets")
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable(op, name, e))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let message = error_message(resp).await;
        if matches!(status, StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY)
            && message.contains("already exists")
        {
            return Err(StoreError::BucketAlreadyExists(name.to_string()));
        }
        Err(StoreError::Rejected {
            op,
            target: name.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        let op = "list_buckets";
        let resp = self
            .request(Method::GET, "/api/v2/buckets")
            .query(&[("org", self.org.as_str()), ("limit", "100")])
            .send()
            .await
            .map_err(|e| unavailable(op, &self.org, e))?;

        if !resp.status().is_success() {
            return Err(rejected(op, &self.org, resp).await);
        }

        let list: BucketList = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("bucket list: {e}")))?;
        Ok(list.buckets.into_iter().map(|b| b.name).collect())
    }

    async fn write_point(&self, bucket: &str, point: &Point) -> Result<(), StoreError> {
        let op = "write_point";
        let mut line = String::with_capacity(160);
        point.write_line(&mut line);

        let write = self.writer.write_line_protocol(&self.org, bucket, line);
        match tokio::time::timeout(self.timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(RequestError::Http { status, text })) => {
                if status.as_u16() == StatusCode::NOT_FOUND.as_u16() {
                    return Err(StoreError::BucketNotFound(bucket.to_string()));
                }
                Err(StoreError::Rejected {
                    op,
                    target: bucket.to_string(),
                    status: status.as_u16(),
                    message: influx_message(text),
                })
            }
            Ok(Err(e)) => Err(StoreError::Unavailable {
                op,
                target: bucket.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(StoreError::Unavailable {
                op,
                target: bucket.to_string(),
                message: format!("no response within {}ms", self.timeout.as_millis()),
            }),
        }
    }

    async fn query(&self, query: &WindowedQuery) -> Result<RowStream, StoreError> {
        let bucket = query.bucket.clone();
        let resp = self.post_query(&bucket, query.to_flux()).await?;

        let bytes = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
        let mut lines = Box::pin(LinesStream::new(StreamReader::new(bytes).lines()));

        let rows = async_stream::stream! {
            let mut parser = AnnotatedCsvParser::default();
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(StoreError::QueryProcessing(format!(
                            "reading results from bucket '{bucket}': {e}"
                        )));
                        break;
                    }
                };
                match parser.push_line(&line) {
                    Ok(Some(row)) => yield Ok(row),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(rows))
    }

    async fn list_devices(&self, query: &DeviceListQuery) -> Result<Vec<String>, StoreError> {
        let resp = self.post_query(&query.bucket, query.to_flux()).await?;
        let body = resp
            .text()
            .await
            .map_err(|e| unavailable("list_devices", &query.bucket, e))?;

        let mut parser = ColumnParser::new("device_id");
        let mut devices = Vec::new();
        for line in body.lines() {
            if let Some(device) = parser.push_line(line)? {
                devices.push(device);
            }
        }
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        extract::Query,
        http::StatusCode as HttpStatus,
        response::{IntoResponse, Response as HttpResponse},
        routing::{get, post},
        Json, Router,
    };
    use futures::TryStreamExt;
    use serde_json::{json, Value};
    use telemetry_client::query::WindowPeriod;
    use time::macros::datetime;

    use super::*;
    use crate::store::FluxRow;

    const WINDOW_CSV: &str = "\
#datatype,string,long,dateTime:RFC3339,double,string,string\r
#group,false,false,false,false,true,true\r
#default,mean,,,,,\r
,result,table,_time,_value,_field,device_id\r
,,0,2024-01-01T00:01:00Z,21.5,temperature,stm32-1\r
,,0,2024-01-01T00:02:00Z,,temperature,stm32-1\r
\r
";

    const DEVICES_CSV: &str = "\
#datatype,string,long,string\r
#group,false,false,false\r
#default,_result,,\r
,result,table,device_id\r
,,0,stm32-1\r
,,0,stm32-2\r
\r
";

    fn not_found(message: &str) -> HttpResponse {
        (HttpStatus::NOT_FOUND, Json(json!({ "code": "not found", "message": message }))).into_response()
    }

    async fn buckets(Query(q): Query<HashMap<String, String>>) -> HttpResponse {
        match q.get("name").map(String::as_str) {
            Some("known") => Json(json!({ "buckets": [{ "name": "known" }] })).into_response(),
            Some("gone") => not_found("bucket \"gone\" not found"),
            Some(_) => Json(json!({ "buckets": [] })).into_response(),
            None => Json(json!({ "buckets": [{ "name": "_monitoring" }, { "name": "known" }] })).into_response(),
        }
    }

    async fn create_bucket() -> HttpResponse {
        (
            HttpStatus::UNPROCESSABLE_ENTITY,
            Json(json!({ "code": "unprocessable entity", "message": "bucket with name taken already exists" })),
        )
            .into_response()
    }

    async fn orgs(Query(q): Query<HashMap<String, String>>) -> HttpResponse {
        match q.get("org").map(String::as_str) {
            Some("capiot") => Json(json!({ "orgs": [{ "id": "0a1b", "name": "capiot" }] })).into_response(),
            _ => Json(json!({ "orgs": [] })).into_response(),
        }
    }

    async fn write(Query(q): Query<HashMap<String, String>>) -> HttpResponse {
        match q.get("bucket").map(String::as_str) {
            Some("known") => HttpStatus::NO_CONTENT.into_response(),
            _ => not_found("bucket not found"),
        }
    }

    async fn flux(Json(body): Json<Value>) -> HttpResponse {
        let flux = body["query"].as_str().unwrap_or_default();
        if flux.contains(r#"from(bucket: "missing")"#) {
            not_found("failed to initialize execute state: could not find bucket \"missing\"")
        } else if flux.contains("unique(") {
            DEVICES_CSV.into_response()
        } else {
            WINDOW_CSV.into_response()
        }
    }

    async fn stub_influx() -> String {
        let app = Router::new()
            .route("/health", get(|| async { Json(json!({ "name": "influxdb", "status": "pass" })) }))
            .route("/api/v2/buckets", get(buckets).post(create_bucket))
            .route("/api/v2/orgs", get(orgs))
            .route("/api/v2/write", post(write))
            .route("/api/v2/query", post(flux));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn store(url: &str, org: &str) -> InfluxStore {
        InfluxStore::new(&InfluxDbConfig {
            url: url.to_string(),
            token: "test-token".to_string(),
            org: org.to_string(),
            request_timeout_ms: 5_000,
        })
        .unwrap()
    }

    fn windowed(bucket: &str) -> WindowedQuery {
        WindowedQuery {
            bucket: bucket.to_string(),
            measurement: "sensor_data",
            device_id: "stm32-1".to_string(),
            fields: vec!["temperature".to_string()],
            start: datetime!(2024-01-01 00:00:00 UTC),
            stop: datetime!(2024-01-01 00:02:00 UTC),
            every: WindowPeriod::parse("1m").unwrap(),
            create_empty: true,
        }
    }

    #[tokio::test]
    async fn health_and_bucket_listing() {
        let s = store(&stub_influx().await, "capiot");
        s.health().await.unwrap();
        assert_eq!(s.list_buckets().await.unwrap(), vec!["_monitoring", "known"]);
    }

    #[tokio::test]
    async fn bucket_exists_treats_not_found_and_empty_list_as_absent() {
        let s = store(&stub_influx().await, "capiot");
        assert!(s.bucket_exists("known").await.unwrap());
        assert!(!s.bucket_exists("absent").await.unwrap());
        assert!(!s.bucket_exists("gone").await.unwrap());
    }

    #[tokio::test]
    async fn already_exists_on_create_is_reported_and_ensure_tolerates_it() {
        let s = store(&stub_influx().await, "capiot");
        assert!(matches!(s.create_bucket("taken").await, Err(StoreError::BucketAlreadyExists(b)) if b == "taken"));
        assert!(!s.ensure_bucket("taken").await.unwrap());
    }

    #[tokio::test]
    async fn create_without_matching_org_is_organization_not_found() {
        let s = store(&stub_influx().await, "ghost");
        assert!(matches!(s.create_bucket("new").await, Err(StoreError::OrganizationNotFound(o)) if o == "ghost"));
    }

    #[tokio::test]
    async fn write_maps_missing_bucket() {
        let s = store(&stub_influx().await, "capiot");
        let point = Point {
            measurement: "sensor_data".to_string(),
            tags: [("device_id".to_string(), "stm32-1".to_string())].into_iter().collect(),
            fields: [("temperature".to_string(), 21.5)].into_iter().collect(),
            timestamp: datetime!(2024-01-01 00:00:30 UTC),
        };
        s.write_point("known", &point).await.unwrap();
        assert!(matches!(s.write_point("other", &point).await, Err(StoreError::BucketNotFound(_))));
    }

    #[tokio::test]
    async fn query_streams_rows_with_nulls_and_maps_missing_bucket() {
        let s = store(&stub_influx().await, "capiot");

        let rows: Vec<FluxRow> = s.query(&windowed("known")).await.unwrap().try_collect().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, Some(21.5));
        assert_eq!(rows[1].value, None);
        assert_eq!(rows[1].device_id, "stm32-1");

        assert!(matches!(s.query(&windowed("missing")).await, Err(StoreError::BucketNotFound(b)) if b == "missing"));
    }

    #[tokio::test]
    async fn list_devices_reads_unique_tag_values() {
        let s = store(&stub_influx().await, "capiot");
        let q = DeviceListQuery { bucket: "known".to_string(), measurement: "sensor_data" };
        assert_eq!(s.list_devices(&q).await.unwrap(), vec!["stm32-1", "stm32-2"]);

        let missing = DeviceListQuery { bucket: "missing".to_string(), measurement: "sensor_data" };
        assert!(matches!(s.list_devices(&missing).await, Err(StoreError::BucketNotFound(_))));
    }
}
