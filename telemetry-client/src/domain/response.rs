use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One aggregation window of a series.
///
/// `value` is `None` for a window with no samples, which is distinct from
/// a window whose mean is exactly zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub value: Option<f64>,
}

/// Sensor readings of one device, keyed by field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorQueryResponse {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub readings: BTreeMap<String, Vec<DataPoint>>,
}

/// Consumption readings of one device, keyed by metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionQueryResponse {
    pub device_id: String,
    pub readings: BTreeMap<String, Vec<DataPoint>>,
}
