use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};

use super::{QueryError, WindowPeriod};

/// Upper bound on aggregation windows per series in one query.
pub const MAX_QUERY_POINTS: u64 = 15_000;

/// A validated `[start, stop)` range with its aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: OffsetDateTime,
    pub stop: OffsetDateTime,
    pub every: WindowPeriod,
    pub estimated_points: u64,
}

/// Parse an RFC 3339 bound and normalize it to UTC.
pub fn parse_timestamp(bound: &'static str, value: &str) -> Result<OffsetDateTime, QueryError> {
    let invalid = || QueryError::InvalidTimeFormat {
        bound,
        value: value.to_string(),
    };

    let ts = OffsetDateTime::parse(value.trim(), &Rfc3339)
        .map_err(|_| invalid())?
        .to_offset(UtcOffset::UTC);

    // Bounds are rendered back as four-digit years.
    if !(0..=9999).contains(&ts.year()) {
        return Err(invalid());
    }
    Ok(ts)
}

/// Number of windows of size `every` needed to cover `[start, stop)`.
///
/// Computed in floating point so that very wide ranges over tiny windows
/// cannot overflow.
pub fn estimate_points(start: OffsetDateTime, stop: OffsetDateTime, every: WindowPeriod) -> f64 {
    let range = (stop - start).whole_nanoseconds() as f64;
    (range / every.as_nanos() as f64).ceil()
}

/// Validate a raw `(start, stop, window)` triple.
///
/// Checks run in a fixed order: presence, timestamp syntax, ordering,
/// window syntax and sign, then the point ceiling.
pub fn validate_time_window(start: &str, stop: &str, window: &str) -> Result<TimeWindow, QueryError> {
    if start.trim().is_empty() || stop.trim().is_empty() {
        return Err(QueryError::MissingTimeRange);
    }

    let start_ts = parse_timestamp("time_range_start", start)?;
    let stop_ts = parse_timestamp("time_range_stop", stop)?;

    if start_ts >= stop_ts {
        return Err(QueryError::InvalidTimeRange {
            start: start.to_string(),
            stop: stop.to_string(),
        });
    }

    let every = WindowPeriod::parse(window)?;

    let estimated = estimate_points(start_ts, stop_ts, every);
    if estimated > MAX_QUERY_POINTS as f64 {
        return Err(QueryError::QueryTooBroad {
            // Saturating cast; the exact value only matters for the message.
            estimated_points: estimated as u64,
            max_points: MAX_QUERY_POINTS,
        });
    }

    Ok(TimeWindow {
        start: start_ts,
        stop: stop_ts,
        every,
        estimated_points: estimated as u64,
    })
}
