//! Time expression parsing for recipe expressions.
//!
//! Two halves:
//! - [`relative`] turns strings like `"30 days ago"` or `"2020-01-01"` into
//!   datetimes, relative to a caller-supplied "now".
//! - [`ranges`] builds intelligent date ranges such as "last year" or
//!   "current mtd" and converts dates to day boundaries.

pub mod ranges;
pub mod relative;

pub use ranges::{
    DateDelta, calc_date_range, convert_to_end_datetime, convert_to_eod_datetime,
    convert_to_start_datetime, date_offset,
};
pub use relative::{format_date, format_datetime, parse_datetime};

/// Errors from parsing time expressions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeParseError {
    /// The text is not a date, datetime, or supported relative expression.
    #[error("Can't convert '{0}' to a date.")]
    Unparseable(String),

    #[error("Unknown intelligent date offset: {0}")]
    UnknownOffset(String),

    #[error("Unknown intelligent date units: {0}")]
    UnknownUnits(String),

    /// Date arithmetic left chrono's supported range.
    #[error("date out of range")]
    OutOfRange,
}

pub type Result<T> = std::result::Result<T, TimeParseError>;
