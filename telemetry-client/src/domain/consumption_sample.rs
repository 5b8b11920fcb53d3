use serde::{Deserialize, Serialize};

/// Measurement name for consumption points.
pub const CONSUMPTION_MEASUREMENT: &str = "consumption_data";

/// Fixed bucket holding consumption points for every device.
pub const CONSUMPTION_BUCKET: &str = "consumption_data";

/// One electrical consumption sample from a metering device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionSample {
    #[serde(default)]
    pub device_id: String,
    pub current: f64,
    pub voltage: f64,
    pub power: f64,
    #[serde(default, rename = "timestamp")]
    pub raw_timestamp: String,
}
