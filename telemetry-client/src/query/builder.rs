use crate::domain::{
    ConsumptionMetric, ConsumptionQuery, SensorField, SensorQuery, CONSUMPTION_BUCKET,
    CONSUMPTION_MEASUREMENT, SENSOR_MEASUREMENT,
};

use super::{validate_time_window, QueryError, WindowedQuery};

fn require(value: &str, name: &'static str) -> Result<(), QueryError> {
    if value.trim().is_empty() {
        return Err(QueryError::MissingParameter(name));
    }
    Ok(())
}

fn push_unique(fields: &mut Vec<String>, name: &str) {
    if !fields.iter().any(|f| f == name) {
        fields.push(name.to_string());
    }
}

/// Build the windowed query for a sensor request.
///
/// The bucket is the request's location. Empty windows are materialized
/// so every requested field yields one entry per window.
pub fn build_sensor_query(req: &SensorQuery) -> Result<WindowedQuery, QueryError> {
    require(&req.location_id, "location_id")?;
    require(&req.device_id, "device_id")?;
    if req.sensor_types.iter().all(|s| s.trim().is_empty()) {
        return Err(QueryError::MissingParameter("sensor_type"));
    }

    let window = validate_time_window(&req.time_range_start, &req.time_range_stop, &req.window_period)?;

    let mut fields = Vec::with_capacity(req.sensor_types.len());
    for raw in req.sensor_types.iter().filter(|s| !s.trim().is_empty()) {
        let field: SensorField = raw.trim().parse()?;
        push_unique(&mut fields, field.as_str());
    }

    Ok(WindowedQuery {
        bucket: req.location_id.trim().to_string(),
        measurement: SENSOR_MEASUREMENT,
        device_id: req.device_id.trim().to_string(),
        fields,
        start: window.start,
        stop: window.stop,
        every: window.every,
        create_empty: true,
    })
}

/// Build the windowed query for a consumption request against the shared
/// consumption bucket. No metrics means all of them.
pub fn build_consumption_query(req: &ConsumptionQuery) -> Result<WindowedQuery, QueryError> {
    require(&req.device_id, "device_id")?;

    let window = validate_time_window(&req.time_range_start, &req.time_range_stop, &req.window_period)?;

    let mut fields = Vec::with_capacity(ConsumptionMetric::ALL.len());
    for raw in req.metric_names() {
        let metric: ConsumptionMetric = raw.trim().parse()?;
        push_unique(&mut fields, metric.as_str());
    }

    Ok(WindowedQuery {
        bucket: CONSUMPTION_BUCKET.to_string(),
        measurement: CONSUMPTION_MEASUREMENT,
        device_id: req.device_id.trim().to_string(),
        fields,
        start: window.start,
        stop: window.stop,
        every: window.every,
        create_empty: true,
    })
}
