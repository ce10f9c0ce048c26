//! Parse absolute and relative date strings.
//!
//! Supported inputs:
//! - `2020-01-01`, `01/14/2020`
//! - `2020-01-01 10:00:00[.ffffff]` and the ISO `T` separator form
//! - `now`, `today`, `yesterday`, `tomorrow`
//! - `<n> <unit>[s] [ago]` where unit is second, minute, hour, day, week,
//!   month or year. A bare `1 day` means one day ago.
//!
//! Anything in the future beyond `tomorrow` (e.g. `1 day from now`) is
//! rejected.

use chrono::{Duration, Months, NaiveDate, NaiveDateTime, Timelike};

use crate::{Result, TimeParseError};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse `text` into a datetime, resolving relative expressions against `now`.
pub fn parse_datetime(text: &str, now: NaiveDateTime) -> Result<NaiveDateTime> {
    let trimmed = text.trim();
    let unparseable = || TimeParseError::Unparseable(text.to_string());

    match trimmed.to_ascii_lowercase().as_str() {
        "now" | "today" => return Ok(now),
        "yesterday" => return Ok(now - Duration::days(1)),
        "tomorrow" => return Ok(now + Duration::days(1)),
        _ => {}
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(d.and_hms_opt(0, 0, 0).ok_or_else(unparseable)?);
        }
    }

    parse_relative(trimmed, now).ok_or_else(unparseable)
}

/// `<n> <unit>[s] [ago]`
fn parse_relative(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let lower = text.to_ascii_lowercase();
    let parts: Vec<&str> = lower.split_whitespace().collect();
    let (count, unit) = match parts.as_slice() {
        [n, unit] | [n, unit, "ago"] => (*n, *unit),
        _ => return None,
    };
    let count: u32 = match count {
        "a" | "an" => 1,
        n => n.parse().ok()?,
    };
    let unit = unit.strip_suffix('s').unwrap_or(unit);
    let n = i64::from(count);
    match unit {
        "second" => now.checked_sub_signed(Duration::seconds(n)),
        "minute" => now.checked_sub_signed(Duration::minutes(n)),
        "hour" => now.checked_sub_signed(Duration::hours(n)),
        "day" => now.checked_sub_signed(Duration::days(n)),
        "week" => now.checked_sub_signed(Duration::weeks(n)),
        "month" => now.checked_sub_months(Months::new(count)),
        "year" => now.checked_sub_months(Months::new(count.checked_mul(12)?)),
        _ => None,
    }
}

/// Render a date the way it appears in SQL literals (`YYYY-MM-DD`).
pub fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Render a datetime for SQL literals. Microseconds are only shown when
/// non-zero: `2020-01-13 09:21:34`, `2019-12-31 23:59:59.999999`.
pub fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 14)
            .unwrap()
            .and_hms_opt(9, 21, 34)
            .unwrap()
    }

    fn parse(s: &str) -> String {
        format_datetime(parse_datetime(s, now()).unwrap())
    }

    #[test]
    fn absolute_dates() {
        assert_eq!(parse("2020-01-01"), "2020-01-01 00:00:00");
        assert_eq!(parse("2020-01-30 10:11:12"), "2020-01-30 10:11:12");
        assert_eq!(parse("2020-01-30T10:11:12"), "2020-01-30 10:11:12");
        assert_eq!(parse("01/02/2020"), "2020-01-02 00:00:00");
    }

    #[test]
    fn keywords() {
        assert_eq!(parse("now"), "2020-01-14 09:21:34");
        assert_eq!(parse("Today"), "2020-01-14 09:21:34");
        assert_eq!(parse("yesterday"), "2020-01-13 09:21:34");
    }

    #[test]
    fn relative_expressions() {
        assert_eq!(parse("1 day ago"), "2020-01-13 09:21:34");
        assert_eq!(parse("1 day"), "2020-01-13 09:21:34");
        assert_eq!(parse("1 days ago"), "2020-01-13 09:21:34");
        assert_eq!(parse("30 days ago"), "2019-12-15 09:21:34");
        assert_eq!(parse("2 weeks ago"), "2019-12-31 09:21:34");
        assert_eq!(parse("1 month ago"), "2019-12-14 09:21:34");
        assert_eq!(parse("a year ago"), "2019-01-14 09:21:34");
    }

    #[test]
    fn rejects_future_and_garbage() {
        for bad in ["1 day from now", "potato", "", "1 fortnight"] {
            let err = parse_datetime(bad, now()).unwrap_err();
            assert_eq!(err.to_string(), format!("Can't convert '{bad}' to a date."));
        }
    }

    #[test]
    fn datetime_formatting() {
        let eod = NaiveDate::from_ymd_opt(2019, 12, 31)
            .unwrap()
            .and_hms_micro_opt(23, 59, 59, 999_999)
            .unwrap();
        assert_eq!(format_datetime(eod), "2019-12-31 23:59:59.999999");
        assert_eq!(format_date(eod.date()), "2019-12-31");
    }
}
