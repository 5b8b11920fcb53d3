use std::fmt::Write as _;

use time::OffsetDateTime;

use super::WindowPeriod;

/// Escape `s` for use inside a double-quoted Flux string literal.
///
/// Flux strings treat backslash and double quote as special and expand
/// `${...}` interpolations, so all three are escaped.
fn flux_escape_str(s: &str, out: &mut String) {
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' | '"' => {
                out.push('\\');
                out.push(ch);
            }
            '$' if chars.peek() == Some(&'{') => {
                out.push('\\');
                out.push('$');
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
}

fn push_string_literal(out: &mut String, s: &str) {
    out.push('"');
    flux_escape_str(s, out);
    out.push('"');
}

/// Quoted, escaped Flux string literal.
pub fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    push_string_literal(&mut out, s);
    out
}

/// RFC 3339 UTC literal with nanosecond precision. Callers guarantee a
/// four-digit year (see `validate::parse_timestamp`).
pub fn time_literal(ts: OffsetDateTime) -> String {
    let ts = ts.to_offset(time::UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:09}Z",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second(),
        ts.nanosecond()
    )
}

/// `r["_field"] == "a" or r["_field"] == "b"`.
pub fn field_filter<S: AsRef<str>>(fields: &[S]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push_str(" or ");
        }
        out.push_str(r#"r["_field"] == "#);
        push_string_literal(&mut out, field.as_ref());
    }
    out
}

/// A mean-aggregated, windowed read of one device's fields in one bucket.
///
/// This is the structured form of the query; `to_flux` renders it for the
/// store and in-process stores may evaluate it directly.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedQuery {
    pub bucket: String,
    pub measurement: &'static str,
    pub device_id: String,
    pub fields: Vec<String>,
    pub start: OffsetDateTime,
    pub stop: OffsetDateTime,
    pub every: WindowPeriod,
    /// Emit a null-valued row for windows without samples.
    pub create_empty: bool,
}

impl WindowedQuery {
    pub fn to_flux(&self) -> String {
        let mut q = String::with_capacity(512);

        q.push_str("from(bucket: ");
        push_string_literal(&mut q, &self.bucket);
        q.push_str(")\n");

        let _ = writeln!(
            q,
            "  |> range(start: {}, stop: {})",
            time_literal(self.start),
            time_literal(self.stop)
        );

        q.push_str(r#"  |> filter(fn: (r) => r["_measurement"] == "#);
        push_string_literal(&mut q, self.measurement);
        q.push_str(")\n");

        q.push_str(r#"  |> filter(fn: (r) => r["device_id"] == "#);
        push_string_literal(&mut q, &self.device_id);
        q.push_str(")\n");

        let _ = writeln!(q, "  |> filter(fn: (r) => {})", field_filter(&self.fields));

        let _ = writeln!(
            q,
            "  |> aggregateWindow(every: {}, fn: mean, createEmpty: {})",
            self.every, self.create_empty
        );
        q.push_str(r#"  |> yield(name: "mean")"#);
        q
    }
}

/// Distinct `device_id` tag values of one measurement in a bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceListQuery {
    pub bucket: String,
    pub measurement: &'static str,
}

impl DeviceListQuery {
    pub fn to_flux(&self) -> String {
        let mut q = String::with_capacity(256);

        q.push_str("from(bucket: ");
        push_string_literal(&mut q, &self.bucket);
        q.push_str(")\n");
        q.push_str("  |> range(start: 0)\n");

        q.push_str(r#"  |> filter(fn: (r) => r["_measurement"] == "#);
        push_string_literal(&mut q, self.measurement);
        q.push_str(")\n");

        q.push_str("  |> keep(columns: [\"device_id\"])\n");
        q.push_str("  |> group()\n");
        q.push_str("  |> unique(column: \"device_id\")");
        q
    }
}
