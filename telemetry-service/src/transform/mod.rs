use std::collections::BTreeMap;

use telemetry_client::domain::{
    ConsumptionMetric, ConsumptionSample, SensorSample, CONSUMPTION_MEASUREMENT, SENSOR_MEASUREMENT,
};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

use crate::{error::ServiceError, store::Point};

fn check_identifier(name: &str, value: &str) -> Result<(), ServiceError> {
    if value.chars().any(char::is_control) {
        return Err(ServiceError::InvalidFormat(format!("{name} must not contain control characters")));
    }
    // A trailing backslash would escape the separator after the tag value.
    if value.ends_with('\\') {
        return Err(ServiceError::InvalidFormat(format!("{name} must not end with a backslash")));
    }
    Ok(())
}

fn check_finite(name: &str, value: f64) -> Result<(), ServiceError> {
    if !value.is_finite() {
        return Err(ServiceError::InvalidFormat(format!("{name} must be a finite number")));
    }
    Ok(())
}

/// Pure validation of a `SensorSample`.
///
/// Rules:
/// - device_id must be non-empty.
/// - identifiers must not contain control characters.
/// - value must be finite.
pub fn validate_sensor_sample(s: &SensorSample) -> Result<(), ServiceError> {
    let res = (|| {
        if s.device_id.trim().is_empty() {
            return Err(ServiceError::MissingParameter("device_id is required".to_string()));
        }
        check_identifier("device_id", &s.device_id)?;
        check_identifier("location_id", &s.location_id)?;
        check_finite("value", s.value)
    })();

    if res.is_err() {
        metrics::counter!("validation_sensor_sample_rejected_total").increment(1);
    }
    res
}

/// Pure validation of a `ConsumptionSample`.
///
/// Rules:
/// - device_id and timestamp must be non-empty.
/// - current, voltage and power must be finite.
pub fn validate_consumption_sample(s: &ConsumptionSample) -> Result<(), ServiceError> {
    let res = (|| {
        if s.device_id.trim().is_empty() {
            return Err(ServiceError::MissingParameter("device_id is required".to_string()));
        }
        if s.raw_timestamp.trim().is_empty() {
            return Err(ServiceError::MissingParameter("timestamp is required".to_string()));
        }
        check_identifier("device_id", &s.device_id)?;
        check_finite("current", s.current)?;
        check_finite("voltage", s.voltage)?;
        check_finite("power", s.power)
    })();

    if res.is_err() {
        metrics::counter!("validation_consumption_sample_rejected_total").increment(1);
    }
    res
}

/// Server receive times for one batch, strictly increasing.
///
/// Samples that fall back to server time must not share a timestamp, or
/// points of the same series would overwrite each other in the store.
#[derive(Debug, Default)]
pub struct ReceiveClock {
    last: Option<OffsetDateTime>,
}

impl ReceiveClock {
    pub fn now(&mut self) -> OffsetDateTime {
        let mut now = OffsetDateTime::now_utc();
        if let Some(last) = self.last {
            if now <= last {
                now = last + Duration::nanoseconds(1);
            }
        }
        self.last = Some(now);
        now
    }
}

/// Parse a device-supplied RFC 3339 timestamp, falling back to
/// `received_at` when it is missing or unparseable.
pub fn resolve_timestamp(raw: Option<&str>, received_at: OffsetDateTime) -> OffsetDateTime {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return received_at;
    };

    match OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(ts) => ts,
        Err(e) => {
            tracing::warn!(timestamp = %raw, error = %e, "unparseable timestamp, using server time");
            metrics::counter!("ingest_timestamp_fallback_total").increment(1);
            received_at
        }
    }
}

/// Bucket a sensor sample is written to: its location, or the default.
pub fn sensor_bucket<'a>(s: &'a SensorSample, default_location: &'a str) -> &'a str {
    let location = s.location_id.trim();
    if location.is_empty() {
        default_location
    } else {
        location
    }
}

fn device_tags(device_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("device_id".to_string(), device_id.trim().to_string())])
}

pub fn sensor_point(s: &SensorSample, received_at: OffsetDateTime) -> Point {
    Point {
        measurement: SENSOR_MEASUREMENT.to_string(),
        tags: device_tags(&s.device_id),
        fields: BTreeMap::from([(s.field.as_str().to_string(), s.value)]),
        timestamp: resolve_timestamp(s.timestamp_text(), received_at),
    }
}

pub fn consumption_point(s: &ConsumptionSample, received_at: OffsetDateTime) -> Point {
    let fields = ConsumptionMetric::ALL
        .iter()
        .map(|m| {
            let value = match m {
                ConsumptionMetric::Current => s.current,
                ConsumptionMetric::Voltage => s.voltage,
                ConsumptionMetric::Power => s.power,
            };
            (m.as_str().to_string(), value)
        })
        .collect();

    Point {
        measurement: CONSUMPTION_MEASUREMENT.to_string(),
        tags: device_tags(&s.device_id),
        fields,
        timestamp: resolve_timestamp(Some(&s.raw_timestamp), received_at),
    }
}
