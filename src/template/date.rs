//! Date format token substitution for date fields.
//!
//! Formats like `"DD MMM YYYY"` are resolved against the field's calendar
//! value. Matching is ordered longest-first so overlapping tokens cannot be
//! substituted twice (`YYYY` must never be consumed as two `YY`s) — this
//! ordering is a correctness requirement, not a stylistic choice.

use chrono::{Datelike, NaiveDate};

/// Supported tokens, longest first. Each maps to a chrono format spec.
///
/// `M` and `D` are unpadded and handled without a chrono specifier for
/// portability.
const TOKENS: &[&str] = &[
    "dddd", "YYYY", "MMMM", "MMM", "ddd", "YY", "MM", "DD", "M", "D",
];

fn substitute(token: &str, date: NaiveDate) -> String {
    match token {
        "YYYY" => date.format("%Y").to_string(),
        "YY" => date.format("%y").to_string(),
        "MMMM" => date.format("%B").to_string(),
        "MMM" => date.format("%b").to_string(),
        "MM" => date.format("%m").to_string(),
        "M" => date.month().to_string(),
        "DD" => date.format("%d").to_string(),
        "D" => date.day().to_string(),
        "dddd" => date.format("%A").to_string(),
        "ddd" => date.format("%a").to_string(),
        _ => unreachable!("unknown token"),
    }
}

/// Parse a raw date field value.
///
/// Accepts ISO `YYYY-MM-DD` or an RFC 3339 timestamp. Anything else is
/// treated as unparseable, in which case formatting passes the raw value
/// through unmodified.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Format a raw date value with the given token format.
///
/// Invalid or unparseable values pass through unmodified.
pub fn format_date(value: &str, format: &str) -> String {
    let Some(date) = parse_date(value) else {
        return value.to_string();
    };

    let mut out = String::with_capacity(format.len());
    let mut rest = format;
    'outer: while !rest.is_empty() {
        for token in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(&substitute(token, date));
                rest = tail;
                continue 'outer;
            }
        }
        let ch = rest.chars().next().unwrap();
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_format() {
        assert_eq!(format_date("2024-03-07", "YYYY/MM/DD"), "2024/03/07");
    }

    #[test]
    fn test_short_month_format() {
        assert_eq!(format_date("2024-03-07", "DD MMM YYYY"), "07 Mar 2024");
    }

    #[test]
    fn test_long_names() {
        assert_eq!(format_date("2024-03-07", "dddd, MMMM D"), "Thursday, March 7");
    }

    #[test]
    fn test_unpadded_tokens() {
        assert_eq!(format_date("2024-03-07", "M/D/YY"), "3/7/24");
    }

    #[test]
    fn test_longest_token_wins() {
        // A naive sequential replace would turn YYYY into the YY value twice
        // or corrupt the second token; ordered matching must not.
        assert_eq!(format_date("2024-03-07", "YYYY YY"), "2024 24");
        assert_eq!(format_date("2024-03-07", "MMMM MMM MM M"), "March Mar 03 3");
        assert_eq!(format_date("2024-03-07", "dddd ddd DD D"), "Thursday Thu 07 7");
    }

    #[test]
    fn test_literal_characters_pass_through() {
        assert_eq!(format_date("2024-03-07", "[DD.MM.YYYY]"), "[07.03.2024]");
    }

    #[test]
    fn test_invalid_date_passes_through() {
        assert_eq!(format_date("not a date", "YYYY-MM-DD"), "not a date");
        assert_eq!(format_date("", "YYYY"), "");
    }

    #[test]
    fn test_rfc3339_input() {
        assert_eq!(
            format_date("2024-03-07T12:30:00Z", "YYYY-MM-DD"),
            "2024-03-07"
        );
    }
}
