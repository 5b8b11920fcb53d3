use std::time::Instant;

use telemetry_client::{
    domain::{ConsumptionQuery, ConsumptionQueryResponse, SensorQuery, SensorQueryResponse},
    query::{build_consumption_query, build_sensor_query, WindowedQuery},
};

use super::DataService;
use crate::{
    aggregate,
    error::ServiceError,
    store::{RowStream, StoreError},
};

fn rejected(e: impl Into<ServiceError>) -> ServiceError {
    metrics::counter!("queries_rejected_total").increment(1);
    e.into()
}

impl DataService {
    /// Run `q`, mapping a missing bucket to `None`.
    async fn execute(&self, q: &WindowedQuery) -> Result<Option<RowStream>, ServiceError> {
        metrics::counter!("queries_executed_total").increment(1);
        tracing::debug!(bucket = %q.bucket, device_id = %q.device_id, every = %q.every, "executing windowed query");

        match self.store.query(q).await {
            Ok(rows) => Ok(Some(rows)),
            Err(StoreError::BucketNotFound(bucket)) => {
                tracing::debug!(bucket = %bucket, "bucket vanished before query, returning no data");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(bucket = %q.bucket, error = %e, "query failed");
                Err(ServiceError::store("query", &q.bucket, e))
            }
        }
    }

    /// Windowed mean over the requested sensor fields.
    ///
    /// A location without a bucket has no data yet and yields an empty
    /// result.
    pub async fn query_sensor(&self, req: &SensorQuery) -> Result<Vec<SensorQueryResponse>, ServiceError> {
        let q = build_sensor_query(req).map_err(rejected)?;
        let started = Instant::now();

        let exists = self
            .store
            .bucket_exists(&q.bucket)
            .await
            .map_err(|e| ServiceError::store("bucket_exists", &q.bucket, e))?;
        if !exists {
            return Ok(Vec::new());
        }

        let out = match self.execute(&q).await? {
            Some(rows) => aggregate::collect_sensor(rows).await?,
            None => Vec::new(),
        };

        metrics::histogram!("query_duration_seconds", "kind" => "sensor").record(started.elapsed().as_secs_f64());
        Ok(out)
    }

    /// Windowed mean over the requested consumption metrics of one device.
    pub async fn query_consumption(&self, req: &ConsumptionQuery) -> Result<ConsumptionQueryResponse, ServiceError> {
        let q = build_consumption_query(req).map_err(rejected)?;
        let started = Instant::now();

        let out = match self.execute(&q).await? {
            Some(rows) => aggregate::collect_consumption(&q.device_id, rows).await?,
            None => ConsumptionQueryResponse {
                device_id: q.device_id.clone(),
                readings: Default::default(),
            },
        };

        metrics::histogram!("query_duration_seconds", "kind" => "consumption")
            .record(started.elapsed().as_secs_f64());
        Ok(out)
    }
}
