//! Display formatting shared by capture receipts and browse views.

use chrono::{DateTime, Local, TimeZone, Utc};

const TIMESTAMP_FORMAT: &str = "%Y/%-m/%-d %-H:%M:%S";

/// Render a timestamp in the server's local time zone (`2026/10/5 9:03:07`).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    format_timestamp_in(ts, &Local)
}

/// Render a timestamp in the given time zone.
pub fn format_timestamp_in<Tz: TimeZone>(ts: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    ts.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_format_in_utc() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 5, 9, 3, 7).unwrap();
        assert_eq!(format_timestamp_in(&ts, &Utc), "2026/10/5 9:03:07");
    }

    #[test]
    fn test_format_in_japan() {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let ts = Utc.with_ymd_and_hms(2026, 12, 31, 20, 0, 0).unwrap();
        assert_eq!(format_timestamp_in(&ts, &jst), "2027/1/1 5:00:00");
    }
}
