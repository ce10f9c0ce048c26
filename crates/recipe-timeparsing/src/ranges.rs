//! Intelligent date ranges ("last year", "current qtr") and day boundaries.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::{Result, TimeParseError};

/// A calendar-aware step used when shifting a date by an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateDelta {
    Years(u32),
    Months(u32),
    Days(i64),
}

/// Shift `dt` according to `offset`.
///
/// - `prior`, `previous`, `last`: move back by `delta`
/// - `next`: move forward by `delta`
/// - `current`, `this`: leave unchanged
pub fn date_offset(dt: NaiveDate, offset: &str, delta: DateDelta) -> Result<NaiveDate> {
    let backwards = match offset {
        "prior" | "previous" | "last" => true,
        "next" => false,
        "current" | "this" => return Ok(dt),
        other => return Err(TimeParseError::UnknownOffset(other.to_string())),
    };
    let shifted = match (delta, backwards) {
        (DateDelta::Years(n), true) => dt.checked_sub_months(Months::new(n * 12)),
        (DateDelta::Years(n), false) => dt.checked_add_months(Months::new(n * 12)),
        (DateDelta::Months(n), true) => dt.checked_sub_months(Months::new(n)),
        (DateDelta::Months(n), false) => dt.checked_add_months(Months::new(n)),
        (DateDelta::Days(n), true) => dt.checked_sub_signed(Duration::days(n)),
        (DateDelta::Days(n), false) => dt.checked_add_signed(Duration::days(n)),
    };
    shifted.ok_or(TimeParseError::OutOfRange)
}

/// Build an inclusive date range from an offset, units, and a reference date.
///
/// Units:
/// - `year`: the full year
/// - `ytd`: the start of the year up to the date
/// - `qtr`: the full quarter the date belongs to
/// - `month`: the full month
/// - `mtd`: the start of the month up to the date
/// - `day`: just the date
pub fn calc_date_range(offset: &str, units: &str, dt: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    let offset = offset.to_ascii_lowercase();
    let units = units.to_ascii_lowercase();
    let ymd = |y: i32, m: u32, d: u32| NaiveDate::from_ymd_opt(y, m, d).ok_or(TimeParseError::OutOfRange);

    match units.as_str() {
        "year" => {
            let dt = date_offset(dt, &offset, DateDelta::Years(1))?;
            Ok((ymd(dt.year(), 1, 1)?, ymd(dt.year(), 12, 31)?))
        }
        "ytd" => {
            let dt = date_offset(dt, &offset, DateDelta::Years(1))?;
            Ok((ymd(dt.year(), 1, 1)?, dt))
        }
        "qtr" => {
            let dt = date_offset(dt, &offset, DateDelta::Months(3))?;
            let qtr = (dt.month() - 1) / 3;
            let start = ymd(dt.year(), qtr * 3 + 1, 1)?;
            Ok((start, end_of_month(ymd(dt.year(), qtr * 3 + 3, 1)?)?))
        }
        "month" => {
            let dt = date_offset(dt, &offset, DateDelta::Months(1))?;
            let start = ymd(dt.year(), dt.month(), 1)?;
            Ok((start, end_of_month(start)?))
        }
        "mtd" => {
            let dt = date_offset(dt, &offset, DateDelta::Months(1))?;
            Ok((ymd(dt.year(), dt.month(), 1)?, dt))
        }
        "day" => {
            let dt = date_offset(dt, &offset, DateDelta::Days(1))?;
            Ok((dt, dt))
        }
        other => Err(TimeParseError::UnknownUnits(other.to_string())),
    }
}

fn end_of_month(first: NaiveDate) -> Result<NaiveDate> {
    first
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .ok_or(TimeParseError::OutOfRange)
}

fn last_moment() -> NaiveTime {
    NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or_default()
}

/// The first moment of the day.
pub fn convert_to_start_datetime(d: NaiveDate) -> NaiveDateTime {
    d.and_time(NaiveTime::default())
}

/// The last moment of the day (23:59:59.999999).
pub fn convert_to_end_datetime(d: NaiveDate) -> NaiveDateTime {
    d.and_time(last_moment())
}

/// Push a datetime to the end of its day, but only when it sits exactly on
/// midnight. Anything with a time component is left alone.
pub fn convert_to_eod_datetime(dt: NaiveDateTime) -> NaiveDateTime {
    if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 && dt.nanosecond() == 0 {
        convert_to_end_datetime(dt.date())
    } else {
        dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format_datetime;
    use pretty_assertions::assert_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn year_ranges() {
        let today = d(2020, 1, 14);
        assert_eq!(calc_date_range("last", "year", today).unwrap(), (d(2019, 1, 1), d(2019, 12, 31)));
        assert_eq!(calc_date_range("next", "year", today).unwrap(), (d(2021, 1, 1), d(2021, 12, 31)));
        assert_eq!(calc_date_range("this", "ytd", today).unwrap(), (d(2020, 1, 1), today));
    }

    #[test]
    fn quarter_and_month_ranges() {
        let dt = d(2020, 5, 20);
        assert_eq!(calc_date_range("current", "qtr", dt).unwrap(), (d(2020, 4, 1), d(2020, 6, 30)));
        assert_eq!(calc_date_range("prior", "qtr", dt).unwrap(), (d(2020, 1, 1), d(2020, 3, 31)));
        assert_eq!(calc_date_range("previous", "month", dt).unwrap(), (d(2020, 4, 1), d(2020, 4, 30)));
        assert_eq!(calc_date_range("this", "month", d(2020, 2, 3)).unwrap(), (d(2020, 2, 1), d(2020, 2, 29)));
        assert_eq!(calc_date_range("next", "mtd", dt).unwrap(), (d(2020, 6, 1), d(2020, 6, 20)));
        assert_eq!(calc_date_range("last", "day", dt).unwrap(), (d(2020, 5, 19), d(2020, 5, 19)));
    }

    #[test]
    fn month_offset_clamps_to_month_end() {
        assert_eq!(date_offset(d(2020, 3, 31), "last", DateDelta::Months(1)).unwrap(), d(2020, 2, 29));
    }

    #[test]
    fn unknown_offset_and_units() {
        assert!(matches!(
            calc_date_range("someday", "year", d(2020, 1, 1)),
            Err(TimeParseError::UnknownOffset(_))
        ));
        assert!(matches!(
            calc_date_range("last", "fortnight", d(2020, 1, 1)),
            Err(TimeParseError::UnknownUnits(_))
        ));
    }

    #[test]
    fn day_boundaries() {
        let midnight = convert_to_start_datetime(d(2020, 1, 30));
        assert_eq!(format_datetime(midnight), "2020-01-30 00:00:00");
        assert_eq!(format_datetime(convert_to_eod_datetime(midnight)), "2020-01-30 23:59:59.999999");
        let later = d(2020, 1, 30).and_hms_opt(9, 0, 0).unwrap();
        assert_eq!(convert_to_eod_datetime(later), later);
    }
}
