//! Validation of windowed queries and their rendering as Flux.

pub mod builder;
pub mod duration;
pub mod error;
pub mod flux;
pub mod validate;

pub use builder::{build_consumption_query, build_sensor_query};
pub use duration::WindowPeriod;
pub use error::QueryError;
pub use flux::{DeviceListQuery, WindowedQuery};
pub use validate::{estimate_points, validate_time_window, TimeWindow, MAX_QUERY_POINTS};
