//! Date handling for the tabular store.
//!
//! The sheet has been maintained by hand for years, so date cells show up in
//! several historical conventions. Reads accept every format we have seen in
//! production; writes always emit [`WIRE_FORMAT`] so the sheet converges on
//! one convention over time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Canonical format for every timestamp written back to the store.
pub const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Known legacy formats, tried in order after [`WIRE_FORMAT`].
const LEGACY_DATETIME_FORMATS: &[&str] = &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];
const LEGACY_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

pub fn to_wire(ts: DateTime<Utc>) -> String {
    ts.format(WIRE_FORMAT).to_string()
}

pub fn now_wire() -> String {
    to_wire(Utc::now())
}

/// Parse a cell value in any of the accepted formats. Returns `None` for
/// blank or unrecognizable values; callers decide whether that is an error.
pub fn parse_flexible(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(value, WIRE_FORMAT) {
        return Some(ndt.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in LEGACY_DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ndt.and_utc());
        }
    }
    // Date-only cells are treated as midnight UTC.
    for format in LEGACY_DATE_FORMATS {
        if let Ok(nd) = NaiveDate::parse_from_str(value, format) {
            return nd.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
    }

    None
}

/// Re-normalize an arbitrary input value to the wire format. Unparseable
/// values pass through untouched so the caller can surface them instead of
/// silently dropping data.
pub fn normalize(value: &str) -> String {
    match parse_flexible(value) {
        Some(ts) => to_wire(ts),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_wire_format() {
        let ts = parse_flexible("2024-03-07 14:30:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 7, 14, 30, 0).unwrap());
    }

    #[test]
    fn parses_legacy_day_first_format() {
        let ts = parse_flexible("07/03/2024 14:30:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 7, 14, 30, 0).unwrap());
    }

    #[test]
    fn parses_date_only_as_midnight() {
        let ts = parse_flexible("2024-03-07").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap());
    }

    #[test]
    fn parses_rfc3339() {
        let ts = parse_flexible("2024-03-07T14:30:00Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 7, 14, 30, 0).unwrap());
    }

    #[test]
    fn blank_and_garbage_are_none() {
        assert!(parse_flexible("").is_none());
        assert!(parse_flexible("   ").is_none());
        assert!(parse_flexible("not a date").is_none());
    }

    #[test]
    fn normalize_rewrites_legacy_values() {
        assert_eq!(normalize("07/03/2024 14:30:00"), "2024-03-07 14:30:00");
        assert_eq!(normalize("2024-03-07 14:30:00"), "2024-03-07 14:30:00");
    }

    #[test]
    fn wire_round_trip() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_flexible(&to_wire(now)), Some(now));
    }
}
