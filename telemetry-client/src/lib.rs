//! Reading model and windowed-query construction for the IoT telemetry store.

pub mod domain;
pub mod query;
