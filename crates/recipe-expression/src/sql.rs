//! Compiled SQL expressions and their rendering.
//!
//! A [`SqlExpr`] is dialect independent until rendered. Parentheses are
//! added only where precedence requires them.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use recipe_core::Dialect;
use recipe_timeparsing::{format_date, format_datetime};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Literal {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Null => "NULL".into(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => format_float(*f),
            Self::Str(s) => quote(s),
            Self::Date(d) => quote(&format_date(*d)),
            Self::DateTime(dt) => quote(&format_datetime(*dt)),
        }
    }
}

/// Integral floats keep a trailing `.0` so `3.0` stays `3.0`.
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Concat,
}

impl ArithOp {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
        }
    }

    /// The operator that holds exactly when this one doesn't.
    pub fn inverse(self) -> Option<Self> {
        Some(match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Gte,
            Self::Lte => Self::Gt,
            Self::Gt => Self::Lte,
            Self::Gte => Self::Lt,
            Self::Like => return None,
        })
    }

    /// The operator to use when the operands swap sides.
    pub fn mirror(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Lte => Self::Gte,
            Self::Gt => Self::Lt,
            Self::Gte => Self::Lte,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TruncUnit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
}

impl TruncUnit {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "year" => Self::Year,
            "quarter" => Self::Quarter,
            "month" => Self::Month,
            "week" => Self::Week,
            "day" => Self::Day,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Float,
    Varchar,
    Integer,
}

impl CastType {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Float => "FLOAT",
            Self::Varchar => "VARCHAR",
            Self::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column {
        table: String,
        name: String,
    },
    Literal(Literal),
    Star,
    Arith {
        op: ArithOp,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Compare {
        op: CompareOp,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    And(Vec<SqlExpr>),
    Or(Vec<SqlExpr>),
    Not(Box<SqlExpr>),
    Neg(Box<SqlExpr>),
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    Between {
        expr: Box<SqlExpr>,
        low: Box<SqlExpr>,
        high: Box<SqlExpr>,
    },
    Cast {
        expr: Box<SqlExpr>,
        to: CastType,
    },
    Case {
        whens: Vec<(SqlExpr, SqlExpr)>,
        otherwise: Option<Box<SqlExpr>>,
    },
    Func {
        name: String,
        args: Vec<SqlExpr>,
    },
    CountDistinct(Box<SqlExpr>),
    DateTrunc {
        unit: TruncUnit,
        expr: Box<SqlExpr>,
        datetime: bool,
    },
    Percentile {
        pct: u32,
        expr: Box<SqlExpr>,
    },
    /// A scalar subquery over the whole table, filtered by whatever
    /// filters the enclosing query renders with.
    Total {
        table: String,
        expr: Box<SqlExpr>,
    },
}

/// Rendering settings. `filters` are already-rendered WHERE conditions that
/// `{{ }}` subqueries repeat.
#[derive(Debug, Clone, Default)]
pub struct RenderContext<'a> {
    pub dialect: Dialect,
    pub filters: &'a [String],
}

impl<'a> RenderContext<'a> {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            filters: &[],
        }
    }

    pub fn with_filters(dialect: Dialect, filters: &'a [String]) -> Self {
        Self { dialect, filters }
    }
}

const ATOM: u8 = 100;

impl SqlExpr {
    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Column {
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn func(name: &str, args: Vec<SqlExpr>) -> Self {
        Self::Func {
            name: name.to_string(),
            args,
        }
    }

    pub fn compare(op: CompareOp, left: SqlExpr, right: SqlExpr) -> Self {
        Self::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn arith(op: ArithOp, left: SqlExpr, right: SqlExpr) -> Self {
        Self::Arith {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn cast(expr: SqlExpr, to: CastType) -> Self {
        Self::Cast {
            expr: Box::new(expr),
            to,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// AND together conditions, flattening nested ANDs and folding boolean
    /// literals.
    pub fn and_all(items: Vec<SqlExpr>) -> SqlExpr {
        let mut out = Vec::new();
        for item in items {
            match item {
                Self::Literal(Literal::Bool(true)) => {}
                Self::Literal(Literal::Bool(false)) => return Self::Literal(Literal::Bool(false)),
                Self::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Self::Literal(Literal::Bool(true)),
            1 => out.remove(0),
            _ => Self::And(out),
        }
    }

    /// OR together conditions, flattening nested ORs and folding boolean
    /// literals.
    pub fn or_all(items: Vec<SqlExpr>) -> SqlExpr {
        let mut out = Vec::new();
        for item in items {
            match item {
                Self::Literal(Literal::Bool(false)) => {}
                Self::Literal(Literal::Bool(true)) => return Self::Literal(Literal::Bool(true)),
                Self::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Self::Literal(Literal::Bool(false)),
            1 => out.remove(0),
            _ => Self::Or(out),
        }
    }

    /// Logical negation, pushed into the expression where that gives
    /// simpler SQL.
    pub fn negate(self) -> SqlExpr {
        match self {
            Self::Literal(Literal::Bool(b)) => Self::Literal(Literal::Bool(!b)),
            Self::Not(inner) => *inner,
            Self::Compare { op, left, right } => match op.inverse() {
                Some(inv) => Self::Compare {
                    op: inv,
                    left,
                    right,
                },
                None => Self::Not(Box::new(Self::Compare { op, left, right })),
            },
            Self::IsNull { expr, negated } => Self::IsNull {
                expr,
                negated: !negated,
            },
            Self::InList {
                expr,
                list,
                negated,
            } => Self::InList {
                expr,
                list,
                negated: !negated,
            },
            other => Self::Not(Box::new(other)),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Neg(_) => 9,
            Self::Arith {
                op: ArithOp::Mul | ArithOp::Div,
                ..
            } => 8,
            Self::Arith { .. } => 7,
            Self::Compare { .. }
            | Self::IsNull { .. }
            | Self::Between { .. }
            | Self::InList { negated: false, .. } => 5,
            Self::Not(_) => 4,
            Self::And(_) => 3,
            Self::Or(_) => 2,
            _ => ATOM,
        }
    }

    /// Render `child` inside an operator of precedence `parent`. With
    /// `strict`, equal precedence also gets parentheses.
    fn operand(child: &SqlExpr, parent: u8, strict: bool, ctx: &RenderContext<'_>) -> String {
        let prec = child.precedence();
        let sql = child.render(ctx);
        if prec < parent || (strict && prec == parent) {
            format!("({sql})")
        } else {
            sql
        }
    }

    /// Render as SQL for the context's dialect.
    pub fn render(&self, ctx: &RenderContext<'_>) -> String {
        match self {
            Self::Column { table, name } => format!("{table}.{name}"),
            Self::Literal(lit) => lit.render(),
            Self::Star => "*".into(),
            Self::Arith { op, left, right } => {
                let prec = self.precedence();
                let strict_right = matches!(op, ArithOp::Sub | ArithOp::Div);
                format!(
                    "{} {} {}",
                    Self::operand(left, prec, false, ctx),
                    op.as_sql(),
                    Self::operand(right, prec, strict_right, ctx)
                )
            }
            Self::Compare { op, left, right } => format!(
                "{} {} {}",
                Self::operand(left, 5, true, ctx),
                op.as_sql(),
                Self::operand(right, 5, true, ctx)
            ),
            Self::And(items) => items
                .iter()
                .map(|i| Self::operand(i, 3, false, ctx))
                .collect::<Vec<_>>()
                .join(" AND "),
            Self::Or(items) => items
                .iter()
                .map(|i| Self::operand(i, 2, false, ctx))
                .collect::<Vec<_>>()
                .join(" OR "),
            Self::Not(inner) => format!("NOT {}", Self::operand(inner, ATOM, false, ctx)),
            Self::Neg(inner) => format!("-{}", Self::operand(inner, ATOM, false, ctx)),
            Self::IsNull { expr, negated } => format!(
                "{} IS {}NULL",
                Self::operand(expr, 5, true, ctx),
                if *negated { "NOT " } else { "" }
            ),
            Self::InList {
                expr,
                list,
                negated,
            } => {
                let items = list
                    .iter()
                    .map(|i| i.render(ctx))
                    .collect::<Vec<_>>()
                    .join(", ");
                let expr = Self::operand(expr, 5, true, ctx);
                if *negated {
                    format!("({expr} NOT IN ({items}))")
                } else {
                    format!("{expr} IN ({items})")
                }
            }
            Self::Between { expr, low, high } => format!(
                "{} BETWEEN {} AND {}",
                Self::operand(expr, 5, true, ctx),
                Self::operand(low, 5, true, ctx),
                Self::operand(high, 5, true, ctx)
            ),
            Self::Cast { expr, to } => format!("CAST({} AS {})", expr.render(ctx), to.as_sql()),
            Self::Case { whens, otherwise } => {
                let mut out = String::from("CASE");
                for (cond, value) in whens {
                    out.push_str(&format!(
                        " WHEN {} THEN {}",
                        Self::operand(cond, ATOM, false, ctx),
                        value.render(ctx)
                    ));
                }
                if let Some(e) = otherwise {
                    out.push_str(&format!(" ELSE {}", e.render(ctx)));
                }
                out.push_str(" END");
                out
            }
            Self::Func { name, args } => format!(
                "{name}({})",
                args.iter()
                    .map(|a| a.render(ctx))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::CountDistinct(inner) => {
                format!("count(DISTINCT {})", Self::operand(inner, ATOM, false, ctx))
            }
            Self::DateTrunc {
                unit,
                expr,
                datetime,
            } => render_date_trunc(*unit, &expr.render(ctx), *datetime, ctx.dialect),
            Self::Percentile { pct, expr } => render_percentile(*pct, &expr.render(ctx), ctx.dialect),
            Self::Total { table, expr } => {
                let mut sql = format!("(SELECT {} FROM {table}", expr.render(ctx));
                if !ctx.filters.is_empty() {
                    sql.push_str(" WHERE ");
                    sql.push_str(&ctx.filters.join(" AND "));
                }
                sql.push(')');
                sql
            }
        }
    }

    /// Render as one item of an `AND` list, parenthesized if it binds looser.
    pub fn render_conjunct(&self, ctx: &RenderContext<'_>) -> String {
        Self::operand(self, 3, false, ctx)
    }

    /// Render for a dialect with no enclosing filters.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.render(&RenderContext::new(dialect))
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql(Dialect::default()))
    }
}

fn render_date_trunc(unit: TruncUnit, expr: &str, datetime: bool, dialect: Dialect) -> String {
    match dialect {
        Dialect::Postgresql => format!("date_trunc('{}', {expr})", unit.as_str()),
        Dialect::Bigquery => {
            let part = match unit {
                TruncUnit::Week => "week(monday)",
                other => other.as_str(),
            };
            if datetime {
                format!("datetime(timestamp_trunc({expr}, {part}))")
            } else {
                format!("date_trunc({expr}, {part})")
            }
        }
        // SQLite has no date_trunc; use its date modifiers instead
        Dialect::Sqlite => match unit {
            TruncUnit::Year => format!("date({expr}, 'start of year')"),
            TruncUnit::Month => format!("date({expr}, 'start of month')"),
            TruncUnit::Day => format!("date({expr})"),
            TruncUnit::Week => format!("date({expr}, '-6 days', 'weekday 1')"),
            TruncUnit::Quarter => format!(
                "date({expr}, 'start of month', printf('-%d months', (CAST(strftime('%m', {expr}) AS INTEGER) - 1) % 3))"
            ),
        },
    }
}

fn render_percentile(pct: u32, expr: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Bigquery => format!("approx_quantiles({expr}, 100)[OFFSET({pct})]"),
        // Rejected at compile time for SQLite; render the portable form.
        Dialect::Postgresql | Dialect::Sqlite => {
            format!("percentile_cont({}) WITHIN GROUP (ORDER BY {expr})", format_float(f64::from(pct) / 100.0))
        }
    }
}
