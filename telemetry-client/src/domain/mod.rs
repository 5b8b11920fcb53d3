pub mod consumption_sample;
pub mod field;
pub mod query;
pub mod response;
pub mod sensor_sample;

pub use consumption_sample::{ConsumptionSample, CONSUMPTION_BUCKET, CONSUMPTION_MEASUREMENT};
pub use field::{ConsumptionMetric, InvalidFieldName, SensorField};
pub use query::{ConsumptionQuery, SensorQuery};
pub use response::{ConsumptionQueryResponse, DataPoint, SensorQueryResponse};
pub use sensor_sample::{SensorSample, SENSOR_MEASUREMENT};
