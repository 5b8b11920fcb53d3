pub mod aggregate;
pub mod api;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod metrics_server;
pub mod observability;
pub mod service;
pub mod store;
pub mod transform;

pub use error::ServiceError;
pub use service::DataService;
