//! Time-series store boundary.
//!
//! [`TimeSeriesStore`] is the only way the rest of the service touches
//! persisted readings. [`influx::InfluxStore`] talks to InfluxDB 2.x over
//! HTTP; [`memory::InMemoryStore`] evaluates the same queries in process.

pub mod annotated_csv;
pub mod influx;
pub mod line_protocol;
pub mod memory;

use std::{collections::BTreeMap, pin::Pin};

use futures::Stream;
use telemetry_client::query::{DeviceListQuery, WindowedQuery};
use time::OffsetDateTime;

pub use influx::InfluxStore;
pub use memory::InMemoryStore;

/// A single point to write: one measurement, tagged, with numeric fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    pub timestamp: OffsetDateTime,
}

/// One row of a windowed query result. `value` is `None` for an empty
/// window.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxRow {
    pub time: OffsetDateTime,
    pub device_id: String,
    pub field: String,
    pub value: Option<f64>,
}

pub type RowStream = Pin<Box<dyn Stream<Item = Result<FluxRow, StoreError>> + Send>>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("bucket '{0}' not found")]
    BucketNotFound(String),
    #[error("bucket '{0}' already exists")]
    BucketAlreadyExists(String),
    #[error("organization '{0}' not found")]
    OrganizationNotFound(String),
    #[error("{op} on '{target}' failed: {message}")]
    Unavailable {
        op: &'static str,
        target: String,
        message: String,
    },
    #[error("{op} on '{target}' rejected by store (HTTP {status}): {message}")]
    Rejected {
        op: &'static str,
        target: String,
        status: u16,
        message: String,
    },
    #[error("malformed store response: {0}")]
    Decode(String),
    #[error("query failed while streaming results: {0}")]
    QueryProcessing(String),
}

#[async_trait::async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn health(&self) -> Result<(), StoreError>;

    /// `Ok(false)` when the store reports the bucket as not found.
    async fn bucket_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Create `name` in the configured organization. Fails with
    /// `OrganizationNotFound` if the organization is missing and with
    /// `BucketAlreadyExists` if another writer got there first.
    async fn create_bucket(&self, name: &str) -> Result<(), StoreError>;

    async fn list_buckets(&self) -> Result<Vec<String>, StoreError>;

    async fn write_point(&self, bucket: &str, point: &Point) -> Result<(), StoreError>;

    async fn query(&self, query: &WindowedQuery) -> Result<RowStream, StoreError>;

    /// Distinct device ids with points in the bucket, in store order.
    async fn list_devices(&self, query: &DeviceListQuery) -> Result<Vec<String>, StoreError>;

    /// Make sure `name` exists. Losing a creation race is not an error.
    ///
    /// Returns whether this call created the bucket.
    async fn ensure_bucket(&self, name: &str) -> Result<bool, StoreError> {
        if self.bucket_exists(name).await? {
            return Ok(false);
        }

        match self.create_bucket(name).await {
            Ok(()) => {
                tracing::info!(bucket = %name, "bucket created");
                metrics::counter!("store_buckets_created_total").increment(1);
                Ok(true)
            }
            Err(StoreError::BucketAlreadyExists(_)) => {
                tracing::debug!(bucket = %name, "bucket created concurrently by another writer");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
