use super::ConsumptionMetric;

/// Windowed sensor query as received from a client; validated by
/// [`crate::query::build_sensor_query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorQuery {
    pub location_id: String,
    pub device_id: String,
    pub sensor_types: Vec<String>,
    pub time_range_start: String,
    pub time_range_stop: String,
    pub window_period: String,
}

/// Windowed consumption query as received from a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumptionQuery {
    pub device_id: String,
    /// Empty means all of [`ConsumptionMetric::ALL`].
    pub metrics: Vec<String>,
    pub time_range_start: String,
    pub time_range_stop: String,
    pub window_period: String,
}

impl ConsumptionQuery {
    /// Requested metric names, or the canonical set when none were given.
    pub fn metric_names(&self) -> Vec<String> {
        if self.metrics.is_empty() {
            ConsumptionMetric::ALL
                .iter()
                .map(|m| m.as_str().to_string())
                .collect()
        } else {
            self.metrics.clone()
        }
    }
}
