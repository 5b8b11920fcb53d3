use super::Point;

/// Escape a measurement name: commas and spaces.
fn lp_escape_measurement(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

/// Escape tag keys, tag values and field keys: commas, spaces and equals.
fn lp_escape_key(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

fn push_tag(out: &mut String, key: &str, value: &str) {
    out.push(',');
    lp_escape_key(key, out);
    out.push('=');
    lp_escape_key(value, out);
}

fn push_field_f64(out: &mut String, first: &mut bool, key: &str, value: f64) {
    if *first {
        *first = false;
    } else {
        out.push(',');
    }

    lp_escape_key(key, out);
    out.push('=');
    // No `i` suffix, so the store types the field as float.
    out.push_str(&value.to_string());
}

pub trait LineProtocol {
    fn write_line(&self, out: &mut String);
}

impl LineProtocol for Point {
    fn write_line(&self, out: &mut String) {
        lp_escape_measurement(&self.measurement, out);

        // Empty tag values are not representable.
        for (key, value) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            push_tag(out, key, value);
        }

        out.push(' ');
        let mut first = true;
        for (key, value) in &self.fields {
            push_field_f64(out, &mut first, key, *value);
        }

        // timestamp (nanos)
        out.push(' ');
        out.push_str(&self.timestamp.unix_timestamp_nanos().to_string());
    }
}
