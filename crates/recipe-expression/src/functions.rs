//! Function names recognized in expressions.

use crate::sql::TruncUnit;

/// Percentiles that can be requested as `percentile<N>`.
pub const PERCENTILES: &[u32] = &[1, 5, 10, 25, 50, 75, 90, 95, 99];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountDistinct,
    Median,
    Percentile(u32),
}

impl Aggregate {
    pub fn name(self) -> String {
        match self {
            Self::Sum => "sum".into(),
            Self::Avg => "avg".into(),
            Self::Min => "min".into(),
            Self::Max => "max".into(),
            Self::Count => "count".into(),
            Self::CountDistinct => "count_distinct".into(),
            Self::Median => "median".into(),
            Self::Percentile(n) => format!("percentile{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    If,
    Coalesce,
    Substr,
    String,
    Int,
    Date,
    Trunc(TruncUnit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Aggregate(Aggregate),
    Scalar(Scalar),
}

/// Look up a function by name, case-insensitively.
pub fn lookup(name: &str) -> Option<Function> {
    let lower = name.to_ascii_lowercase();
    let agg = |a| Some(Function::Aggregate(a));
    let scalar = |s| Some(Function::Scalar(s));
    match lower.as_str() {
        "sum" => agg(Aggregate::Sum),
        "avg" | "average" => agg(Aggregate::Avg),
        "min" => agg(Aggregate::Min),
        "max" => agg(Aggregate::Max),
        "count" => agg(Aggregate::Count),
        "count_distinct" => agg(Aggregate::CountDistinct),
        "median" => agg(Aggregate::Median),
        "if" => scalar(Scalar::If),
        "coalesce" => scalar(Scalar::Coalesce),
        "substr" => scalar(Scalar::Substr),
        "string" => scalar(Scalar::String),
        "int" => scalar(Scalar::Int),
        "date" => scalar(Scalar::Date),
        other => {
            if let Some(unit) = TruncUnit::from_name(other) {
                return scalar(Scalar::Trunc(unit));
            }
            let digits = other.strip_prefix("percentile")?;
            digits.parse().ok().map(|n| Function::Aggregate(Aggregate::Percentile(n)))
        }
    }
}
