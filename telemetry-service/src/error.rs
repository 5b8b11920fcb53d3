use axum::http::StatusCode;
use telemetry_client::query::QueryError;

use crate::store::StoreError;

/// Request-level failure, carrying enough to render a structured
/// `{code, message}` response.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("{0}")]
    MissingParameter(String),
    #[error("{0}")]
    InvalidFormat(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("query processing error: {0}")]
    QueryProcessing(String),
    #[error("{op} on bucket '{bucket}': {source}")]
    Store {
        op: &'static str,
        bucket: String,
        #[source]
        source: StoreError,
    },
    #[error("{message}")]
    Upstream { status: u16, message: String },
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn store(op: &'static str, bucket: &str, source: StoreError) -> Self {
        metrics::counter!("store_errors_total", "op" => op).increment(1);
        Self::Store {
            op,
            bucket: bucket.to_string(),
            source,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Query(e) => match e {
                QueryError::MissingParameter(_) | QueryError::MissingTimeRange => "missing_parameter",
                QueryError::InvalidTimeFormat { .. }
                | QueryError::InvalidWindowFormat { .. }
                | QueryError::NonPositiveWindow(_)
                | QueryError::InvalidField(_) => "invalid_format",
                QueryError::InvalidTimeRange { .. } => "invalid_time_range",
                QueryError::QueryTooBroad { .. } => "query_too_broad",
            },
            Self::MissingParameter(_) => "missing_parameter",
            Self::InvalidFormat(_) => "invalid_format",
            Self::PermissionDenied(_) => "forbidden",
            Self::QueryProcessing(_) => "query_processing_error",
            Self::Store {
                source: StoreError::OrganizationNotFound(_),
                ..
            } => "organization_not_found",
            Self::Store { .. } => "store_unavailable",
            Self::Upstream { .. } | Self::Internal(_) => "internal_server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Query(_) | Self::MissingParameter(_) | Self::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::QueryProcessing(_) | Self::Store { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
