//! Type checking and SQL generation.
//!
//! One walk over the AST both validates and compiles it. Every node yields a
//! [`Typed`] SQL expression. When a node is invalid, an error is recorded
//! and a poisoned value is returned so that its parents stay quiet and the
//! walk can go on to find more problems.

use chrono::NaiveDateTime;
use recipe_core::{DataType, Dialect, TableSchema};
use recipe_timeparsing::{
    calc_date_range, convert_to_end_datetime, convert_to_eod_datetime, convert_to_start_datetime,
    parse_datetime,
};

use crate::ast::{self, Expr, ExprKind, LiteralValue};
use crate::builder::ParseOptions;
use crate::error::Diagnostic;
use crate::functions::{self, Aggregate, Function, PERCENTILES, Scalar};
use crate::sql::{ArithOp, CastType, CompareOp, Literal, SqlExpr, TruncUnit};

/// The type of an expression while it is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    Bool,
    Date,
    DateTime,
    Num,
    Str,
    Null,
    /// A reference to a column that doesn't exist.
    Unknown,
    /// The result of an expression that already reported an error.
    Error,
}

impl Ty {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Num => "num",
            Self::Str => "str",
            Self::Null => "null",
            Self::Unknown => "unknown_col",
            Self::Error => "error",
        }
    }

    pub fn long_name(self) -> &'static str {
        match self {
            Self::Str => "string",
            other => other.name(),
        }
    }

    fn from_datatype(dt: DataType) -> Self {
        match dt {
            DataType::Bool => Self::Bool,
            DataType::Date => Self::Date,
            DataType::DateTime => Self::DateTime,
            DataType::Num => Self::Num,
            DataType::Str => Self::Str,
            DataType::Unusable => Self::Error,
        }
    }

    pub fn datatype(self) -> Option<DataType> {
        match self {
            Self::Bool => Some(DataType::Bool),
            Self::Date => Some(DataType::Date),
            Self::DateTime => Some(DataType::DateTime),
            Self::Num => Some(DataType::Num),
            Self::Str => Some(DataType::Str),
            Self::Null | Self::Unknown | Self::Error => None,
        }
    }

    fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::DateTime)
    }

    fn is_broken(self) -> bool {
        matches!(self, Self::Unknown | Self::Error)
    }

    /// Whether values of the two types can be compared or mixed.
    fn compatible(self, other: Ty) -> bool {
        self == other
            || self == Self::Null
            || other == Self::Null
            || (self.is_temporal() && other.is_temporal())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Typed {
    pub sql: SqlExpr,
    pub ty: Ty,
}

impl Typed {
    fn new(sql: SqlExpr, ty: Ty) -> Self {
        Self { sql, ty }
    }

    fn poisoned() -> Self {
        Self::new(SqlExpr::Literal(Literal::Null), Ty::Error)
    }

    fn is_literal(&self) -> bool {
        self.sql.is_literal()
    }
}

/// The result of a successful compile.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub expr: SqlExpr,
    pub ty: Ty,
    pub is_aggregate: bool,
    /// False when the expression is built from literals alone.
    pub references_columns: bool,
    /// True when a relative date was resolved against the clock.
    pub uses_clock: bool,
}

/// Compile a parsed expression against a table.
pub fn compile(
    expr: &Expr,
    schema: &TableSchema,
    dialect: Dialect,
    options: &ParseOptions,
    now: NaiveDateTime,
) -> Result<Compiled, Vec<Diagnostic>> {
    let mut compiler = Compiler {
        schema,
        dialect,
        options,
        now,
        errors: Vec::new(),
        found_aggregation: false,
        reported_forbidden: false,
        forbid_suspended: 0,
        agg_depth: 0,
        references_columns: false,
        uses_clock: false,
    };
    let typed = compiler.visit(expr);
    if !compiler.errors.is_empty() {
        return Err(compiler.errors);
    }
    Ok(Compiled {
        expr: typed.sql,
        ty: typed.ty,
        is_aggregate: compiler.found_aggregation,
        references_columns: compiler.references_columns,
        uses_clock: compiler.uses_clock,
    })
}

struct Compiler<'a> {
    schema: &'a TableSchema,
    dialect: Dialect,
    options: &'a ParseOptions,
    now: NaiveDateTime,
    errors: Vec<Diagnostic>,
    found_aggregation: bool,
    reported_forbidden: bool,
    /// Nonzero inside `{{ }}`, where aggregation is always allowed.
    forbid_suspended: usize,
    agg_depth: usize,
    references_columns: bool,
    uses_clock: bool,
}

impl Compiler<'_> {
    fn error(&mut self, message: impl Into<String>, pos: usize) {
        self.errors.push(Diagnostic::at(message, pos));
    }

    fn visit(&mut self, expr: &Expr) -> Typed {
        match &expr.kind {
            ExprKind::Column(name) => self.visit_column(name, expr.pos),
            ExprKind::Literal(lit) => self.visit_literal(lit, expr.pos),
            ExprKind::Star => {
                self.error("* can only be used in count(*)", expr.pos);
                Typed::poisoned()
            }
            ExprKind::Neg(inner) => self.visit_neg(inner),
            ExprKind::Not(inner) => {
                let t = self.visit(inner);
                if t.ty.is_broken() {
                    return Typed::poisoned();
                }
                if t.ty != Ty::Bool {
                    self.error("NOT requires a boolean value", expr.pos);
                    return Typed::poisoned();
                }
                Typed::new(t.sql.negate(), Ty::Bool)
            }
            ExprKind::Arith { op, left, right } => self.visit_arith(*op, left, right),
            ExprKind::Compare { op, left, right } => self.visit_compare(*op, left, right),
            ExprKind::And(left, right) => {
                let items = self.visit_conditions(&[left.as_ref(), right.as_ref()]);
                items.map_or_else(Typed::poisoned, |items| {
                    Typed::new(SqlExpr::and_all(items), Ty::Bool)
                })
            }
            ExprKind::Or(left, right) => {
                let items = self.visit_conditions(&[left.as_ref(), right.as_ref()]);
                items.map_or_else(Typed::poisoned, |items| {
                    Typed::new(SqlExpr::or_all(items), Ty::Bool)
                })
            }
            ExprKind::In {
                expr: inner,
                list,
                negated,
            } => self.visit_in(inner, list, *negated),
            ExprKind::Between {
                expr: inner,
                low,
                high,
            } => self.visit_between(inner, low, high),
            ExprKind::Like {
                expr: inner,
                pattern,
                case_insensitive,
                negated,
            } => self.visit_like(inner, pattern, *case_insensitive, *negated),
            ExprKind::IsNull {
                expr: inner,
                negated,
            } => {
                let t = self.visit(inner);
                if t.ty.is_broken() {
                    return Typed::poisoned();
                }
                Typed::new(
                    SqlExpr::IsNull {
                        expr: Box::new(t.sql),
                        negated: *negated,
                    },
                    Ty::Bool,
                )
            }
            ExprKind::IsRange {
                expr: inner,
                offset,
                units,
                offset_pos,
            } => self.visit_range(inner, offset, units, *offset_pos),
            ExprKind::Call { name, args } => self.visit_call(name, args, expr.pos),
            ExprKind::Total(inner) => self.visit_total(inner),
        }
    }

    fn visit_column(&mut self, name: &str, pos: usize) -> Typed {
        let Some(column) = self.schema.find(name).filter(|c| c.datatype.is_usable()) else {
            self.error(format!("{name} is not a valid column name"), pos);
            return Typed::new(SqlExpr::Literal(Literal::Null), Ty::Unknown);
        };
        self.references_columns = true;
        let ty = Ty::from_datatype(column.datatype);
        let sql = SqlExpr::column(&self.schema.name, &column.name);

        let converter = match ty {
            Ty::Date => self.options.convert_dates_with.as_deref(),
            Ty::DateTime => self.options.convert_datetimes_with.as_deref(),
            _ => None,
        };
        let unit = converter
            .and_then(|c| c.strip_suffix("_conv"))
            .and_then(TruncUnit::from_name);
        match unit {
            Some(unit) => Typed::new(
                SqlExpr::DateTrunc {
                    unit,
                    expr: Box::new(sql),
                    datetime: ty == Ty::DateTime,
                },
                ty,
            ),
            None => Typed::new(sql, ty),
        }
    }

    fn visit_neg(&mut self, inner: &Expr) -> Typed {
        let t = self.visit(inner);
        if t.ty.is_broken() {
            return Typed::poisoned();
        }
        match (t.sql.as_literal().and_then(Literal::as_f64), t.ty) {
            (Some(_), _) => {
                let negated = match t.sql {
                    SqlExpr::Literal(Literal::Int(n)) => n
                        .checked_neg()
                        .map_or(Literal::Float(-(n as f64)), Literal::Int),
                    SqlExpr::Literal(Literal::Float(f)) => Literal::Float(-f),
                    _ => Literal::Null,
                };
                Typed::new(SqlExpr::Literal(negated), Ty::Num)
            }
            (None, Ty::Num) => Typed::new(SqlExpr::Neg(Box::new(t.sql)), Ty::Num),
            (None, Ty::Null) => t,
            (None, ty) => {
                self.error(format!("A {} can not be negated", ty.name()), inner.pos);
                Typed::poisoned()
            }
        }
    }

    fn visit_arith(&mut self, op: ast::ArithOp, left: &Expr, right: &Expr) -> Typed {
        let l = self.visit(left);
        let r = self.visit(right);
        if l.ty == Ty::Error || r.ty == Ty::Error {
            return Typed::poisoned();
        }

        let result_ty = match (op, l.ty, r.ty) {
            (_, Ty::Num, Ty::Num) => Some(Ty::Num),
            (ast::ArithOp::Add, Ty::Str, Ty::Str) => Some(Ty::Str),
            (ast::ArithOp::Add, Ty::Null, t) | (ast::ArithOp::Add, t, Ty::Null)
                if matches!(t, Ty::Num | Ty::Str | Ty::Null) =>
            {
                Some(t)
            }
            (_, Ty::Null, Ty::Num | Ty::Null) | (_, Ty::Num, Ty::Null) => Some(Ty::Num),
            _ => None,
        };
        let Some(ty) = result_ty else {
            let verb = match op {
                ast::ArithOp::Add => "can not be added together",
                ast::ArithOp::Sub => "can not be subtracted",
                ast::ArithOp::Mul => "can not be multiplied together",
                ast::ArithOp::Div => "can not be divided",
            };
            self.error(
                format!("{} and {} {verb}", l.ty.long_name(), r.ty.long_name()),
                left.pos,
            );
            return Typed::poisoned();
        };

        if let (Some(a), Some(b)) = (l.sql.as_literal(), r.sql.as_literal()) {
            return match fold_arith(op, a, b) {
                Ok(lit) => Typed::new(SqlExpr::Literal(lit), ty),
                Err(msg) => {
                    self.errors.push(Diagnostic::unplaced(msg));
                    Typed::poisoned()
                }
            };
        }

        let sql = match op {
            ast::ArithOp::Add if ty == Ty::Str => SqlExpr::arith(ArithOp::Concat, l.sql, r.sql),
            ast::ArithOp::Add => SqlExpr::arith(ArithOp::Add, l.sql, r.sql),
            ast::ArithOp::Sub => SqlExpr::arith(ArithOp::Sub, l.sql, r.sql),
            ast::ArithOp::Mul => SqlExpr::arith(ArithOp::Mul, l.sql, r.sql),
            ast::ArithOp::Div => match self.divide(l.sql, r.sql) {
                Some(sql) => sql,
                None => return Typed::poisoned(),
            },
        };
        Typed::new(sql, ty)
    }

    /// Division that never divides by zero at runtime.
    fn divide(&mut self, num: SqlExpr, den: SqlExpr) -> Option<SqlExpr> {
        let cast_num = |num: SqlExpr| {
            if num.is_literal() {
                num
            } else {
                SqlExpr::cast(num, CastType::Float)
            }
        };
        match den.as_literal().map(Literal::as_f64) {
            Some(Some(d)) if d == 0.0 => {
                self.errors.push(Diagnostic::unplaced(DIVIDE_BY_ZERO));
                None
            }
            Some(Some(d)) if d == 1.0 => Some(num),
            Some(_) => Some(SqlExpr::arith(ArithOp::Div, cast_num(num), den)),
            None => Some(SqlExpr::Case {
                whens: vec![(
                    SqlExpr::compare(CompareOp::Eq, den.clone(), SqlExpr::Literal(Literal::Int(0))),
                    SqlExpr::Literal(Literal::Null),
                )],
                otherwise: Some(Box::new(SqlExpr::arith(
                    ArithOp::Div,
                    cast_num(num),
                    SqlExpr::cast(den, CastType::Float),
                ))),
            }),
        }
    }

    fn visit_compare(&mut self, op: ast::CompareOp, left: &Expr, right: &Expr) -> Typed {
        let l = self.visit(left);
        let r = self.visit(right);
        if l.ty.is_broken() || r.ty.is_broken() {
            return Typed::poisoned();
        }
        let Some((l, r)) = self.coerce_pair(l, r) else {
            return Typed::poisoned();
        };
        if !l.ty.compatible(r.ty) {
            self.error(
                format!("Can't compare {} to {}", l.ty.name(), r.ty.name()),
                left.pos,
            );
            return Typed::poisoned();
        }

        let op = match op {
            ast::CompareOp::Eq => CompareOp::Eq,
            ast::CompareOp::Ne => CompareOp::Ne,
            ast::CompareOp::Lt => CompareOp::Lt,
            ast::CompareOp::Lte => CompareOp::Lte,
            ast::CompareOp::Gt => CompareOp::Gt,
            ast::CompareOp::Gte => CompareOp::Gte,
        };
        let (op, l, r) = if l.is_literal() && !r.is_literal() {
            (op.mirror(), r, l)
        } else {
            (op, l, r)
        };

        if r.sql == SqlExpr::Literal(Literal::Null) && matches!(op, CompareOp::Eq | CompareOp::Ne) {
            return Typed::new(
                SqlExpr::IsNull {
                    expr: Box::new(l.sql),
                    negated: op == CompareOp::Ne,
                },
                Ty::Bool,
            );
        }
        if let (Some(a), Some(b)) = (l.sql.as_literal(), r.sql.as_literal()) {
            if let Some(result) = fold_compare(op, a, b) {
                return Typed::new(SqlExpr::Literal(Literal::Bool(result)), Ty::Bool);
            }
        }
        Typed::new(SqlExpr::compare(op, l.sql, r.sql), Ty::Bool)
    }

    /// Operands of AND/OR. `None` when any of them is unusable.
    fn visit_conditions(&mut self, exprs: &[&Expr]) -> Option<Vec<SqlExpr>> {
        let mut out = Vec::new();
        let mut ok = true;
        for e in exprs {
            let t = self.visit(e);
            if t.ty.is_broken() {
                ok = false;
            } else if !matches!(t.ty, Ty::Bool | Ty::Null) {
                self.error("This should be a boolean column or expression", e.pos);
                ok = false;
            }
            out.push(t.sql);
        }
        ok.then_some(out)
    }

    fn visit_in(&mut self, inner: &Expr, list: &[Expr], negated: bool) -> Typed {
        let e = self.visit(inner);
        if e.is_literal() && !e.ty.is_broken() {
            self.error("Must be a column or expression", inner.pos);
            return Typed::poisoned();
        }
        let items: Vec<Typed> = list.iter().map(|i| self.visit(i)).collect();

        let has_str = items.iter().any(|i| i.is_literal() && i.ty == Ty::Str);
        let has_num = items.iter().any(|i| i.is_literal() && i.ty == Ty::Num);
        if has_str && has_num {
            let pos = list.first().map_or(inner.pos, |i| i.pos);
            self.error("An array may not contain both strings and numbers", pos);
            return Typed::poisoned();
        }
        if e.ty.is_broken() || items.iter().any(|i| i.ty.is_broken()) {
            return Typed::poisoned();
        }

        let mut sql_items = Vec::with_capacity(items.len());
        for item in items {
            let item = if e.ty.is_temporal() {
                match self.coerce_temporal(item, e.ty, false) {
                    Some(item) => item,
                    None => return Typed::poisoned(),
                }
            } else {
                item
            };
            if !e.ty.compatible(item.ty) {
                self.error(
                    format!("Can't compare {} to {}", e.ty.name(), item.ty.name()),
                    inner.pos,
                );
                return Typed::poisoned();
            }
            sql_items.push(match item.sql {
                SqlExpr::Literal(Literal::Float(f)) if f.fract() == 0.0 && f.abs() < 1e15 => {
                    SqlExpr::Literal(Literal::Int(f as i64))
                }
                other => other,
            });
        }
        Typed::new(
            SqlExpr::InList {
                expr: Box::new(e.sql),
                list: sql_items,
                negated,
            },
            Ty::Bool,
        )
    }

    fn visit_between(&mut self, inner: &Expr, low: &Expr, high: &Expr) -> Typed {
        let e = self.visit(inner);
        let lo = self.visit(low);
        let hi = self.visit(high);
        if e.ty.is_broken() || lo.ty.is_broken() || hi.ty.is_broken() {
            return Typed::poisoned();
        }
        let (lo, hi) = if e.ty.is_temporal() {
            let lo = self.coerce_temporal(lo, e.ty, false);
            let hi = self.coerce_temporal(hi, e.ty, e.ty == Ty::DateTime);
            match (lo, hi) {
                (Some(lo), Some(hi)) => (lo, hi),
                _ => return Typed::poisoned(),
            }
        } else {
            (lo, hi)
        };
        if !e.ty.compatible(lo.ty) || !e.ty.compatible(hi.ty) {
            self.error(
                format!(
                    "When using between, the column ({}) and between values ({}, {}) must be the same data type.",
                    e.ty.name(),
                    lo.ty.name(),
                    hi.ty.name()
                ),
                inner.pos,
            );
            return Typed::poisoned();
        }
        Typed::new(
            SqlExpr::Between {
                expr: Box::new(e.sql),
                low: Box::new(lo.sql),
                high: Box::new(hi.sql),
            },
            Ty::Bool,
        )
    }

    fn visit_like(&mut self, inner: &Expr, pattern: &Expr, case_insensitive: bool, negated: bool) -> Typed {
        let e = self.visit(inner);
        let p = self.visit(pattern);
        if e.ty.is_broken() || p.ty.is_broken() {
            return Typed::poisoned();
        }
        if e.ty != Ty::Str || p.ty != Ty::Str {
            self.error(
                format!("Can't compare {} to {}", e.ty.name(), p.ty.name()),
                inner.pos,
            );
            return Typed::poisoned();
        }
        let pattern = match p.sql {
            SqlExpr::Literal(Literal::Str(s)) if !s.contains(['%', '_']) => {
                SqlExpr::Literal(Literal::Str(format!("%{s}%")))
            }
            other => other,
        };
        let (left, right) = if case_insensitive {
            (
                SqlExpr::func("lower", vec![e.sql]),
                SqlExpr::func("lower", vec![pattern]),
            )
        } else {
            (e.sql, pattern)
        };
        let sql = SqlExpr::compare(CompareOp::Like, left, right);
        Typed::new(if negated { sql.negate() } else { sql }, Ty::Bool)
    }

    fn visit_range(&mut self, inner: &Expr, offset: &str, units: &str, offset_pos: usize) -> Typed {
        let e = self.visit(inner);
        if e.ty.is_broken() {
            return Typed::poisoned();
        }
        if !e.ty.is_temporal() {
            self.error(
                format!("{offset} {units} can only be used with a date or datetime"),
                inner.pos,
            );
            return Typed::poisoned();
        }
        let (start, end) = match calc_date_range(offset, units, self.now().date()) {
            Ok(range) => range,
            Err(err) => {
                self.error(err.to_string(), offset_pos);
                return Typed::poisoned();
            }
        };
        let (low, high) = if e.ty == Ty::DateTime {
            (
                Literal::DateTime(convert_to_start_datetime(start)),
                Literal::DateTime(convert_to_end_datetime(end)),
            )
        } else {
            (Literal::Date(start), Literal::Date(end))
        };
        Typed::new(
            SqlExpr::Between {
                expr: Box::new(e.sql),
                low: Box::new(SqlExpr::Literal(low)),
                high: Box::new(SqlExpr::Literal(high)),
            },
            Ty::Bool,
        )
    }

    fn visit_total(&mut self, inner: &Expr) -> Typed {
        let saved_found = self.found_aggregation;
        let saved_depth = self.agg_depth;
        self.forbid_suspended += 1;
        self.agg_depth = 0;
        let t = self.visit(inner);
        self.forbid_suspended -= 1;
        self.agg_depth = saved_depth;
        self.found_aggregation = saved_found;
        if t.ty.is_broken() {
            return Typed::poisoned();
        }
        Typed::new(
            SqlExpr::Total {
                table: self.schema.name.clone(),
                expr: Box::new(t.sql),
            },
            t.ty,
        )
    }

    fn visit_call(&mut self, name: &str, args: &[Expr], pos: usize) -> Typed {
        match functions::lookup(name) {
            Some(Function::Aggregate(agg)) => self.visit_aggregate(agg, args, pos),
            Some(Function::Scalar(scalar)) => self.visit_scalar(scalar, name, args, pos),
            None => {
                self.error(format!("{name} is not a valid function"), pos);
                Typed::poisoned()
            }
        }
    }

    fn note_aggregation(&mut self, pos: usize) {
        self.found_aggregation = true;
        if self.options.forbid_aggregation && self.forbid_suspended == 0 && !self.reported_forbidden {
            self.reported_forbidden = true;
            self.error("Aggregations are not allowed in this field.", pos);
        }
    }

    fn visit_aggregate(&mut self, agg: Aggregate, args: &[Expr], pos: usize) -> Typed {
        let name = agg.name();
        let [arg] = args else {
            self.error(format!("{name} expects 1 argument"), pos);
            return Typed::poisoned();
        };
        if self.agg_depth > 0 {
            self.error("Aggregations can not be nested", pos);
            return Typed::poisoned();
        }

        if arg.kind == ExprKind::Star {
            if agg != Aggregate::Count {
                self.error("* can only be used in count(*)", arg.pos);
                return Typed::poisoned();
            }
            self.references_columns = true;
            self.note_aggregation(pos);
            return Typed::new(SqlExpr::func("count", vec![SqlExpr::Star]), Ty::Num);
        }

        self.agg_depth += 1;
        let a = self.visit(arg);
        self.agg_depth -= 1;

        let mut ok = !a.ty.is_broken();
        if let Aggregate::Percentile(n) = agg {
            if !PERCENTILES.contains(&n) {
                self.error(format!("Percentile values of {n} are not supported."), pos);
                ok = false;
            }
        }
        if self.dialect == Dialect::Sqlite {
            match agg {
                Aggregate::Percentile(_) => {
                    self.error("Percentile is not supported on sqlite", pos);
                    ok = false;
                }
                Aggregate::Median => {
                    self.error("Median is not supported on sqlite", pos);
                    ok = false;
                }
                _ => {}
            }
        }
        if !a.ty.is_broken() {
            let allowed = match agg {
                Aggregate::Sum | Aggregate::Avg | Aggregate::Median | Aggregate::Percentile(_) => {
                    matches!(a.ty, Ty::Num | Ty::Null)
                }
                Aggregate::Min | Aggregate::Max => {
                    matches!(a.ty, Ty::Num | Ty::Str | Ty::Date | Ty::DateTime | Ty::Null)
                }
                Aggregate::Count | Aggregate::CountDistinct => true,
            };
            if !allowed {
                self.error(
                    format!("A {} can not be aggregated using {name}.", a.ty.name()),
                    pos,
                );
                ok = false;
            }
        }
        if !ok {
            return Typed::poisoned();
        }
        self.note_aggregation(pos);

        let (sql, ty) = match agg {
            Aggregate::Sum | Aggregate::Avg | Aggregate::Count => {
                (SqlExpr::func(&name, vec![a.sql]), Ty::Num)
            }
            Aggregate::Min | Aggregate::Max => (SqlExpr::func(&name, vec![a.sql]), a.ty),
            Aggregate::CountDistinct => (SqlExpr::CountDistinct(Box::new(a.sql)), Ty::Num),
            Aggregate::Median => (
                SqlExpr::Percentile {
                    pct: 50,
                    expr: Box::new(a.sql),
                },
                Ty::Num,
            ),
            Aggregate::Percentile(pct) => (
                SqlExpr::Percentile {
                    pct,
                    expr: Box::new(a.sql),
                },
                Ty::Num,
            ),
        };
        Typed::new(sql, ty)
    }

    fn check_arity(&mut self, name: &str, args: &[Expr], min: usize, max: usize, pos: usize) -> bool {
        if (min..=max).contains(&args.len()) {
            return true;
        }
        let msg = if min == max {
            format!("{name} expects {min} argument{}", if min == 1 { "" } else { "s" })
        } else {
            format!("{name} expects {min} to {max} arguments")
        };
        self.error(msg, pos);
        false
    }

    fn visit_scalar(&mut self, scalar: Scalar, name: &str, args: &[Expr], pos: usize) -> Typed {
        let name = name.to_ascii_lowercase();
        match scalar {
            Scalar::If => self.visit_if(args, pos),
            Scalar::Coalesce => self.visit_coalesce(args, pos),
            Scalar::Substr => {
                if !self.check_arity(&name, args, 2, 3, pos) {
                    return Typed::poisoned();
                }
                let typed: Vec<Typed> = args.iter().map(|a| self.visit(a)).collect();
                if typed.iter().any(|t| t.ty.is_broken()) {
                    return Typed::poisoned();
                }
                let mut ok = true;
                for (i, (t, arg)) in typed.iter().zip(args).enumerate() {
                    let want = if i == 0 { Ty::Str } else { Ty::Num };
                    if !want.compatible(t.ty) {
                        self.error(
                            format!("substr expects a {}, not {}", want.long_name(), t.ty.long_name()),
                            arg.pos,
                        );
                        ok = false;
                    }
                }
                if !ok {
                    return Typed::poisoned();
                }
                let args = typed.into_iter().map(|t| t.sql).collect();
                Typed::new(SqlExpr::func("substr", args), Ty::Str)
            }
            Scalar::String | Scalar::Int => {
                if !self.check_arity(&name, args, 1, 1, pos) {
                    return Typed::poisoned();
                }
                let t = self.visit(&args[0]);
                if t.ty.is_broken() {
                    return Typed::poisoned();
                }
                if scalar == Scalar::String {
                    Typed::new(SqlExpr::cast(t.sql, CastType::Varchar), Ty::Str)
                } else {
                    Typed::new(SqlExpr::cast(t.sql, CastType::Integer), Ty::Num)
                }
            }
            Scalar::Date => {
                if !self.check_arity(&name, args, 1, 1, pos) {
                    return Typed::poisoned();
                }
                let t = self.visit(&args[0]);
                if t.ty.is_broken() {
                    return Typed::poisoned();
                }
                if let SqlExpr::Literal(Literal::Str(text)) = &t.sql {
                    return match parse_datetime(text, self.now()) {
                        Ok(dt) => Typed::new(SqlExpr::Literal(Literal::DateTime(dt)), Ty::Date),
                        Err(err) => {
                            self.errors.push(Diagnostic::unplaced(err.to_string()));
                            Typed::poisoned()
                        }
                    };
                }
                match t.ty {
                    Ty::Date => t,
                    Ty::DateTime => Typed::new(
                        SqlExpr::DateTrunc {
                            unit: TruncUnit::Day,
                            expr: Box::new(t.sql),
                            datetime: true,
                        },
                        Ty::Date,
                    ),
                    ty => {
                        self.error(
                            format!("date expects a string or a date, not {}", ty.long_name()),
                            args[0].pos,
                        );
                        Typed::poisoned()
                    }
                }
            }
            Scalar::Trunc(unit) => {
                if !self.check_arity(&name, args, 1, 1, pos) {
                    return Typed::poisoned();
                }
                let t = self.visit(&args[0]);
                if t.ty.is_broken() {
                    return Typed::poisoned();
                }
                if !t.ty.is_temporal() {
                    self.error(
                        format!("{name} expects a date or datetime, not {}", t.ty.long_name()),
                        args[0].pos,
                    );
                    return Typed::poisoned();
                }
                Typed::new(
                    SqlExpr::DateTrunc {
                        unit,
                        expr: Box::new(t.sql),
                        datetime: t.ty == Ty::DateTime,
                    },
                    Ty::Date,
                )
            }
        }
    }

    /// `if(cond, value, [cond, value]..., [else])`
    fn visit_if(&mut self, args: &[Expr], pos: usize) -> Typed {
        if args.len() < 2 {
            self.error("if expects a condition and a value", pos);
            return Typed::poisoned();
        }
        let mut ok = true;
        let mut value_ty: Option<Ty> = None;
        let mut whens = Vec::new();
        let mut values = Vec::new();
        let mut otherwise = None;

        for chunk in args.chunks(2) {
            let value_expr = match chunk {
                [cond, value] => {
                    let c = self.visit(cond);
                    if c.ty.is_broken() {
                        ok = false;
                    } else if c.ty != Ty::Bool {
                        self.error("This should be a boolean column or expression", cond.pos);
                        ok = false;
                    }
                    whens.push(c.sql);
                    value
                }
                [value] => value,
                _ => break,
            };
            let v = self.visit(value_expr);
            match (v.ty, value_ty) {
                (ty, _) if ty.is_broken() => ok = false,
                (Ty::Null, _) => {}
                (ty, None) => value_ty = Some(ty),
                (ty, Some(first)) if !first.compatible(ty) => {
                    self.error(
                        format!(
                            "The values in this if statement must be the same type, not {} and {}",
                            first.name(),
                            ty.name()
                        ),
                        value_expr.pos,
                    );
                    ok = false;
                }
                _ => {}
            }
            if chunk.len() == 2 {
                values.push(v);
            } else {
                otherwise = Some(v);
            }
        }
        if !ok {
            return Typed::poisoned();
        }

        let ty = value_ty.unwrap_or(Ty::Null);
        let mut coerce = |t: Typed| -> Option<SqlExpr> {
            if ty.is_temporal() {
                self.coerce_temporal(t, ty, false).map(|t| t.sql)
            } else {
                Some(t.sql)
            }
        };
        let mut pairs = Vec::with_capacity(whens.len());
        for (cond, value) in whens.into_iter().zip(values) {
            let Some(value) = coerce(value) else {
                return Typed::poisoned();
            };
            pairs.push((cond, value));
        }
        let otherwise = match otherwise {
            Some(t) if t.sql == SqlExpr::Literal(Literal::Null) => None,
            Some(t) => match coerce(t) {
                Some(sql) => Some(Box::new(sql)),
                None => return Typed::poisoned(),
            },
            None => None,
        };
        Typed::new(
            SqlExpr::Case {
                whens: pairs,
                otherwise,
            },
            ty,
        )
    }

    fn visit_coalesce(&mut self, args: &[Expr], pos: usize) -> Typed {
        if args.is_empty() {
            self.error("coalesce expects at least 1 argument", pos);
            return Typed::poisoned();
        }
        let typed: Vec<Typed> = args.iter().map(|a| self.visit(a)).collect();
        if typed.iter().any(|t| t.ty.is_broken()) {
            return Typed::poisoned();
        }
        let ty = typed
            .iter()
            .map(|t| t.ty)
            .find(|t| *t != Ty::Null)
            .unwrap_or(Ty::Null);

        let mut out = Vec::with_capacity(typed.len());
        for (t, arg) in typed.into_iter().zip(args) {
            let t = if ty.is_temporal() {
                match self.coerce_temporal(t, ty, false) {
                    Some(t) => t,
                    None => return Typed::poisoned(),
                }
            } else {
                t
            };
            if !ty.compatible(t.ty) {
                self.error(
                    format!(
                        "The values in coalesce must be the same type, not {} and {}",
                        ty.name(),
                        t.ty.name()
                    ),
                    arg.pos,
                );
                return Typed::poisoned();
            }
            out.push(t.sql);
        }
        Typed::new(SqlExpr::func("coalesce", out), ty)
    }

    /// Convert literals on one side of a comparison to the temporal type on
    /// the other side.
    fn coerce_pair(&mut self, l: Typed, r: Typed) -> Option<(Typed, Typed)> {
        if l.ty.is_temporal() && is_temporal_literal(&r.sql) {
            let r = self.coerce_temporal(r, l.ty, false)?;
            return Some((l, r));
        }
        if r.ty.is_temporal() && is_temporal_literal(&l.sql) {
            let l = self.coerce_temporal(l, r.ty, false)?;
            return Some((l, r));
        }
        Some((l, r))
    }

    fn visit_literal(&mut self, lit: &LiteralValue, pos: usize) -> Typed {
        let (lit, ty) = match lit {
            LiteralValue::Null => (Literal::Null, Ty::Null),
            LiteralValue::Bool(b) => (Literal::Bool(*b), Ty::Bool),
            LiteralValue::Int(n) => (Literal::Int(*n), Ty::Num),
            LiteralValue::Float(f) if !f.is_finite() => {
                self.error(NOT_FINITE, pos);
                return Typed::poisoned();
            }
            LiteralValue::Float(f) => (Literal::Float(*f), Ty::Num),
            LiteralValue::Str(s) => (Literal::Str(s.clone()), Ty::Str),
        };
        Typed::new(SqlExpr::Literal(lit), ty)
    }

    /// The clock relative dates resolve against. Marks the result as
    /// depending on it.
    fn now(&mut self) -> NaiveDateTime {
        self.uses_clock = true;
        self.now
    }

    /// Convert a string or date literal to a `target` literal. Anything else
    /// passes through. With `eod`, a midnight datetime moves to the end of
    /// its day.
    fn coerce_temporal(&mut self, t: Typed, target: Ty, eod: bool) -> Option<Typed> {
        let dt = match &t.sql {
            SqlExpr::Literal(Literal::Str(text)) => match parse_datetime(text, self.now()) {
                Ok(dt) => dt,
                Err(err) => {
                    self.errors.push(Diagnostic::unplaced(err.to_string()));
                    return None;
                }
            },
            SqlExpr::Literal(Literal::DateTime(dt)) => *dt,
            SqlExpr::Literal(Literal::Date(d)) => convert_to_start_datetime(*d),
            _ => return Some(t),
        };
        let dt = if eod { convert_to_eod_datetime(dt) } else { dt };
        let lit = match target {
            Ty::Date => Literal::Date(dt.date()),
            _ => Literal::DateTime(dt),
        };
        Some(Typed::new(SqlExpr::Literal(lit), target))
    }
}

const DIVIDE_BY_ZERO: &str = "When dividing, the denominator can not be zero";
const NOT_FINITE: &str = "Numbers must be finite";

fn is_temporal_literal(sql: &SqlExpr) -> bool {
    matches!(
        sql,
        SqlExpr::Literal(Literal::Str(_) | Literal::Date(_) | Literal::DateTime(_))
    )
}


/// Evaluate arithmetic on two literals.
fn fold_arith(op: ast::ArithOp, a: &Literal, b: &Literal) -> Result<Literal, &'static str> {
    use ast::ArithOp::*;
    let lit = match (op, a, b) {
        (_, Literal::Null, _) | (_, _, Literal::Null) => Literal::Null,
        (Add, Literal::Str(x), Literal::Str(y)) => Literal::Str(format!("{x}{y}")),
        (Div, _, den) if den.as_f64() == Some(0.0) => return Err(DIVIDE_BY_ZERO),
        (Div, num, den) if den.as_f64() == Some(1.0) => num.clone(),
        (Add, Literal::Int(x), Literal::Int(y)) => int_or_float(x.checked_add(*y), *x as f64 + *y as f64),
        (Sub, Literal::Int(x), Literal::Int(y)) => int_or_float(x.checked_sub(*y), *x as f64 - *y as f64),
        (Mul, Literal::Int(x), Literal::Int(y)) => int_or_float(x.checked_mul(*y), *x as f64 * *y as f64),
        (op, a, b) => {
            let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
                return Ok(Literal::Null);
            };
            Literal::Float(match op {
                Add => x + y,
                Sub => x - y,
                Mul => x * y,
                Div => x / y,
            })
        }
    };
    if matches!(lit, Literal::Float(f) if !f.is_finite()) {
        return Err(NOT_FINITE);
    }
    Ok(lit)
}

fn int_or_float(exact: Option<i64>, approx: f64) -> Literal {
    exact.map_or(Literal::Float(approx), Literal::Int)
}

/// Evaluate a comparison of two literals, when that is well defined.
fn fold_compare(op: CompareOp, a: &Literal, b: &Literal) -> Option<bool> {
    let ord = match (a, b) {
        (Literal::Str(x), Literal::Str(y)) => x.cmp(y),
        (Literal::Bool(x), Literal::Bool(y)) => x.cmp(y),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?)?,
    };
    Some(match op {
        CompareOp::Eq => ord.is_eq(),
        CompareOp::Ne => ord.is_ne(),
        CompareOp::Lt => ord.is_lt(),
        CompareOp::Lte => ord.is_le(),
        CompareOp::Gt => ord.is_gt(),
        CompareOp::Gte => ord.is_ge(),
        CompareOp::Like => return None,
    })
}
