use crate::domain::InvalidFieldName;

/// Why a windowed query was rejected before reaching the store.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("{0} is required")]
    MissingParameter(&'static str),
    #[error("time_range_start and time_range_stop are required")]
    MissingTimeRange,
    #[error("invalid {bound} '{value}': expected an RFC 3339 timestamp")]
    InvalidTimeFormat { bound: &'static str, value: String },
    #[error("time_range_start ({start}) must be before time_range_stop ({stop})")]
    InvalidTimeRange { start: String, stop: String },
    #[error("invalid window_period '{value}': {reason}")]
    InvalidWindowFormat { value: String, reason: &'static str },
    #[error("window_period '{0}' must be greater than zero")]
    NonPositiveWindow(String),
    #[error(
        "query would return about {estimated_points} points per series, more than the limit of {max_points}; \
         narrow the time range or use a larger window_period"
    )]
    QueryTooBroad { estimated_points: u64, max_points: u64 },
    #[error(transparent)]
    InvalidField(#[from] InvalidFieldName),
}
