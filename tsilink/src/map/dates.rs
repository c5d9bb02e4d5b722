//! Date conversions backing `toEpoche` and `toIsoDate`.
//!
//! Format patterns use moment-style tokens (`DD.MM.YYYY HH:mm`). Text in
//! square brackets is literal. All values are interpreted as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{ExpressionError, ExpressionResult};

/// Pattern tokens, longest first so `YYYY` wins over `YY`.
const TOKENS: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("MMMM", "%B"),
    ("SSS", "%3f"),
    ("MMM", "%b"),
    ("YY", "%y"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("HH", "%H"),
    ("hh", "%I"),
    ("mm", "%M"),
    ("ss", "%S"),
    ("ZZ", "%z"),
    ("M", "%m"),
    ("D", "%d"),
    ("H", "%H"),
    ("h", "%I"),
    ("m", "%M"),
    ("s", "%S"),
    ("A", "%p"),
    ("a", "%p"),
    ("Z", "%:z"),
];

/// Translate a moment-style pattern into a chrono format string.
pub fn to_chrono_format(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;

    'outer: while let Some(c) = rest.chars().next() {
        if c == '[' {
            if let Some(end) = rest.find(']') {
                for lit in rest[1..end].chars() {
                    push_literal(&mut out, lit);
                }
                rest = &rest[end + 1..];
                continue;
            }
        }

        for (token, spec) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'outer;
            }
        }

        push_literal(&mut out, c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

/// Parse `value` with a moment-style `pattern` into a UTC timestamp.
pub fn parse_date(value: &str, pattern: &str) -> ExpressionResult<DateTime<Utc>> {
    let format = to_chrono_format(pattern);
    let invalid = || ExpressionError::InvalidDate {
        value: value.to_string(),
        format: pattern.to_string(),
    };

    if format.contains("%z") || format.contains("%:z") {
        return DateTime::parse_from_str(value, &format)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| invalid());
    }

    let naive = match NaiveDateTime::parse_from_str(value, &format) {
        Ok(dt) => dt,
        Err(_) => NaiveDate::parse_from_str(value, &format)
            .map_err(|_| invalid())?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(invalid)?,
    };

    Ok(Utc.from_utc_datetime(&naive))
}

/// Unix seconds for `value` read with `pattern`.
pub fn to_epoch(value: &str, pattern: &str) -> ExpressionResult<i64> {
    parse_date(value, pattern).map(|dt| dt.timestamp())
}

/// ISO-8601 timestamp (`2017-01-31T10:05:00.000Z`) for `value` read with `pattern`.
pub fn to_iso_date(value: &str, pattern: &str) -> ExpressionResult<String> {
    parse_date(value, pattern).map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}
