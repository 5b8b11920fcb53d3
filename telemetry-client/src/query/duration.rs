use std::{fmt, time::Duration};

use super::QueryError;

const NANOS_PER_US: u128 = 1_000;
const NANOS_PER_MS: u128 = 1_000_000;
const NANOS_PER_S: u128 = 1_000_000_000;
const NANOS_PER_M: u128 = 60 * NANOS_PER_S;
const NANOS_PER_H: u128 = 60 * NANOS_PER_M;
const NANOS_PER_D: u128 = 24 * NANOS_PER_H;
const NANOS_PER_W: u128 = 7 * NANOS_PER_D;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" => Some(NANOS_PER_US),
        "ms" => Some(NANOS_PER_MS),
        "s" => Some(NANOS_PER_S),
        "m" => Some(NANOS_PER_M),
        "h" => Some(NANOS_PER_H),
        "d" => Some(NANOS_PER_D),
        "w" => Some(NANOS_PER_W),
        _ => None,
    }
}

/// Positive, fixed-length aggregation window such as `1h` or `1m30s`.
///
/// Calendar units (`mo`, `y`) are not accepted because their length depends
/// on where the window falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowPeriod {
    nanos: u64,
}

impl WindowPeriod {
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let invalid = |reason| QueryError::InvalidWindowFormat {
            value: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty duration"));
        }

        let (negative, mut rest) = match trimmed.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, trimmed),
        };
        if rest.is_empty() {
            return Err(invalid("missing magnitude"));
        }

        let mut total: u128 = 0;
        while !rest.is_empty() {
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            if digits_end == 0 {
                return Err(invalid("expected a number"));
            }
            let magnitude: u128 = rest[..digits_end]
                .parse()
                .map_err(|_| invalid("number too large"))?;
            rest = &rest[digits_end..];

            let unit_end = rest
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(rest.len());
            if unit_end == 0 {
                return Err(invalid("missing unit"));
            }
            let per_unit = unit_nanos(&rest[..unit_end])
                .ok_or_else(|| invalid("unknown unit; use ns, us, ms, s, m, h, d or w"))?;
            rest = &rest[unit_end..];

            total = magnitude
                .checked_mul(per_unit)
                .and_then(|n| total.checked_add(n))
                .ok_or_else(|| invalid("duration too large"))?;
        }

        if negative || total == 0 {
            return Err(QueryError::NonPositiveWindow(input.to_string()));
        }

        let nanos = u64::try_from(total).map_err(|_| invalid("duration too large"))?;
        Ok(Self { nanos })
    }

    pub fn as_nanos(&self) -> u64 {
        self.nanos
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_nanos(self.nanos)
    }
}

/// Canonical Flux duration literal, e.g. `1h30m` or `250ms`.
impl fmt::Display for WindowPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rem = self.nanos as u128;
        for (unit, size) in [
            ("h", NANOS_PER_H),
            ("m", NANOS_PER_M),
            ("s", NANOS_PER_S),
            ("ms", NANOS_PER_MS),
            ("us", NANOS_PER_US),
            ("ns", 1),
        ] {
            let n = rem / size;
            if n > 0 {
                write!(f, "{n}{unit}")?;
                rem -= n * size;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_compound_units() {
        assert_eq!(WindowPeriod::parse("1h").unwrap().as_duration(), Duration::from_secs(3600));
        assert_eq!(WindowPeriod::parse("1m30s").unwrap().as_duration(), Duration::from_secs(90));
        assert_eq!(WindowPeriod::parse("1ms").unwrap().as_nanos(), 1_000_000);
        assert_eq!(WindowPeriod::parse("2d").unwrap().as_duration(), Duration::from_secs(172_800));
        assert_eq!(WindowPeriod::parse("5µs").unwrap().as_nanos(), 5_000);
    }

    #[test]
    fn renders_canonical_literal() {
        assert_eq!(WindowPeriod::parse("90s").unwrap().to_string(), "1m30s");
        assert_eq!(WindowPeriod::parse("1d").unwrap().to_string(), "24h");
        assert_eq!(WindowPeriod::parse("1500ms").unwrap().to_string(), "1s500ms");
    }

    #[test]
    fn rejects_malformed_durations() {
        for bad in ["", "h", "10", "1.5h", "1mo", "1y", "1h)", "1 h", "-"] {
            assert!(
                matches!(WindowPeriod::parse(bad), Err(QueryError::InvalidWindowFormat { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_zero_and_negative_windows() {
        assert!(matches!(WindowPeriod::parse("0s"), Err(QueryError::NonPositiveWindow(_))));
        assert!(matches!(WindowPeriod::parse("-5m"), Err(QueryError::NonPositiveWindow(_))));
    }
}
