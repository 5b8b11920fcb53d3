use serde::{Deserialize, Serialize};

use super::SensorField;

/// Measurement name for every sensor point, across all location buckets.
pub const SENSOR_MEASUREMENT: &str = "sensor_data";

/// One instantaneous reading reported by a device.
///
/// `timestamp` is kept as the raw string the device sent; it is resolved
/// (with a server-time fallback) when the sample is turned into a point.
/// Devices also send a duplicate `time` key, used only when `timestamp` is
/// absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    #[serde(default)]
    pub location_id: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default, alias = "component_id")]
    pub sensor_id: String,
    pub field: SensorField,
    pub value: f64,
    #[serde(default, rename = "timestamp", skip_serializing_if = "Option::is_none")]
    pub raw_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl SensorSample {
    /// The timestamp text to resolve, preferring `timestamp` over `time`.
    pub fn timestamp_text(&self) -> Option<&str> {
        self.raw_timestamp
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.time.as_deref().filter(|s| !s.is_empty()))
    }
}
