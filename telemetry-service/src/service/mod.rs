//! Ingest and query orchestration over a [`TimeSeriesStore`].

mod ingest;
mod query;

use std::sync::Arc;

use telemetry_client::{
    domain::{CONSUMPTION_BUCKET, SENSOR_MEASUREMENT},
    query::DeviceListQuery,
};

use crate::{
    error::ServiceError,
    store::{StoreError, TimeSeriesStore},
};

/// Entry point for every data operation. Cheap to clone; all clones share
/// the same store handle.
#[derive(Clone)]
pub struct DataService {
    store: Arc<dyn TimeSeriesStore>,
    default_location: String,
}

impl DataService {
    pub fn new(store: Arc<dyn TimeSeriesStore>, default_location: impl Into<String>) -> Self {
        Self {
            store,
            default_location: default_location.into(),
        }
    }

    pub fn default_location(&self) -> &str {
        &self.default_location
    }

    /// Location buckets, without system buckets or the consumption bucket.
    pub async fn list_locations(&self) -> Result<Vec<String>, ServiceError> {
        let buckets = self
            .store
            .list_buckets()
            .await
            .map_err(|e| ServiceError::store("list_buckets", "*", e))?;

        Ok(buckets
            .into_iter()
            .filter(|b| !b.starts_with('_') && b != CONSUMPTION_BUCKET)
            .collect())
    }

    /// Devices that reported sensor data at a location. A location without
    /// a bucket has none.
    pub async fn list_devices(&self, location_id: &str) -> Result<Vec<String>, ServiceError> {
        let location = location_id.trim();
        if location.is_empty() {
            return Err(ServiceError::MissingParameter("location_id is required".to_string()));
        }

        let q = DeviceListQuery {
            bucket: location.to_string(),
            measurement: SENSOR_MEASUREMENT,
        };
        match self.store.list_devices(&q).await {
            Ok(devices) => Ok(devices),
            Err(StoreError::BucketNotFound(_)) => Ok(Vec::new()),
            Err(e) => {
                tracing::error!(bucket = %location, error = %e, "device listing failed");
                Err(ServiceError::store("list_devices", location, e))
            }
        }
    }

    /// Create `bucket` if needed; failures carry the operation and bucket.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), ServiceError> {
        self.store
            .ensure_bucket(bucket)
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(bucket = %bucket, error = %e, "failed to ensure bucket");
                ServiceError::store("ensure_bucket", bucket, e)
            })
    }
}
