use std::collections::BTreeSet;

use telemetry_client::domain::{ConsumptionSample, SensorSample, CONSUMPTION_BUCKET};
use time::OffsetDateTime;

use super::DataService;
use crate::{error::ServiceError, transform};

impl DataService {
    /// Validate the whole batch, then write each sample in order.
    ///
    /// Nothing touches the store unless every sample is valid. The first
    /// store failure aborts the rest of the batch.
    pub async fn ingest_sensor_samples(&self, samples: &[SensorSample]) -> Result<usize, ServiceError> {
        for s in samples {
            transform::validate_sensor_sample(s)?;
        }

        let mut clock = transform::ReceiveClock::default();
        let mut ensured = BTreeSet::new();

        for s in samples {
            let bucket = transform::sensor_bucket(s, &self.default_location);
            if !ensured.contains(bucket) {
                self.ensure_bucket(bucket).await?;
                ensured.insert(bucket.to_string());
            }

            let point = transform::sensor_point(s, clock.now());
            self.store.write_point(bucket, &point).await.map_err(|e| {
                tracing::error!(bucket = %bucket, device_id = %s.device_id, error = %e, "sensor write failed");
                ServiceError::store("write_point", bucket, e)
            })?;
        }

        metrics::counter!("ingest_sensor_samples_total").increment(samples.len() as u64);
        tracing::debug!(count = samples.len(), "sensor samples written");
        Ok(samples.len())
    }

    pub async fn ingest_consumption(&self, sample: &ConsumptionSample) -> Result<(), ServiceError> {
        transform::validate_consumption_sample(sample)?;

        self.ensure_bucket(CONSUMPTION_BUCKET).await?;

        let point = transform::consumption_point(sample, OffsetDateTime::now_utc());
        self.store.write_point(CONSUMPTION_BUCKET, &point).await.map_err(|e| {
            tracing::error!(device_id = %sample.device_id, error = %e, "consumption write failed");
            ServiceError::store("write_point", CONSUMPTION_BUCKET, e)
        })?;

        metrics::counter!("ingest_consumption_samples_total").increment(1);
        Ok(())
    }
}
