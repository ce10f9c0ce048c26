//! Parse field expressions for one table and memoize the results.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDateTime};
use recipe_core::{DataType, Dialect, TableSchema};
use tracing::debug;

use crate::compile::compile;
use crate::error::{ExpressionError, Result};
use crate::parser::parse;
use crate::sql::{RenderContext, SqlExpr};

/// How an expression should be checked and compiled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ParseOptions {
    /// Reject any aggregation. Used for dimensions and filters.
    pub forbid_aggregation: bool,
    /// Wrap a numeric result in `sum()` when it has no aggregation. Used
    /// for metrics.
    pub enforce_aggregation: bool,
    /// Truncate date columns with a converter such as `month_conv`.
    pub convert_dates_with: Option<String>,
    /// Truncate datetime columns with a converter such as `day_conv`.
    pub convert_datetimes_with: Option<String>,
}

impl ParseOptions {
    pub fn forbid_aggregation() -> Self {
        Self {
            forbid_aggregation: true,
            ..Self::default()
        }
    }

    pub fn enforce_aggregation() -> Self {
        Self {
            enforce_aggregation: true,
            ..Self::default()
        }
    }
}

/// A compiled expression and what is known about it.
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderResponse {
    pub expression: SqlExpr,
    pub datatype: DataType,
    pub is_aggregate: bool,
}

impl BuilderResponse {
    pub fn to_sql(&self, ctx: &RenderContext<'_>) -> String {
        self.expression.render(ctx)
    }
}

/// Builds expressions against one table schema.
///
/// Successful parses are cached per (text, options), so shelves that reuse
/// the same field text parse it once. Without a fixed clock, expressions
/// with relative dates are compiled on every call so they follow local time.
pub struct Builder {
    schema: Arc<TableSchema>,
    dialect: Dialect,
    now: Option<NaiveDateTime>,
    cache: Mutex<HashMap<(String, ParseOptions), Arc<BuilderResponse>>>,
}

impl Builder {
    pub fn new(schema: Arc<TableSchema>, dialect: Dialect) -> Self {
        Self {
            schema,
            dialect,
            now: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve relative dates against a fixed clock instead of local time.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The clock relative dates are resolved against.
    pub fn now(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| Local::now().naive_local())
    }

    /// Parse, validate and compile `text`.
    pub fn parse(&self, text: &str, options: &ParseOptions) -> Result<Arc<BuilderResponse>> {
        let key = (text.to_string(), options.clone());
        if let Some(hit) = self.lock_cache().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let ast = parse(text).map_err(|diagnostic| ExpressionError::Syntax {
            text: text.to_string(),
            diagnostic,
        })?;
        debug!(text, ?ast, "parsed expression");

        let compiled = compile(&ast, &self.schema, self.dialect, options, self.now()).map_err(|errors| {
            ExpressionError::Invalid {
                text: text.to_string(),
                errors,
            }
        })?;
        if !compiled.references_columns {
            return Err(ExpressionError::ConstantValue);
        }

        let memoize = self.now.is_some() || !compiled.uses_clock;
        let mut expression = compiled.expr;
        let mut is_aggregate = compiled.is_aggregate;
        let datatype = compiled.ty.datatype().unwrap_or_default();
        if options.enforce_aggregation && !is_aggregate && datatype == DataType::Num {
            expression = SqlExpr::func("sum", vec![expression]);
            is_aggregate = true;
        }

        let response = Arc::new(BuilderResponse {
            expression,
            datatype,
            is_aggregate,
        });
        if memoize {
            self.lock_cache().insert(key, Arc::clone(&response));
        }
        Ok(response)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<(String, ParseOptions), Arc<BuilderResponse>>> {
        // A poisoned cache only means another parse panicked; the map is still valid
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn schema() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::new("datatypes")
                .column("username", DataType::Str)
                .column("department", DataType::Str)
                .column("testid", DataType::Str)
                .column("score", DataType::Num)
                .column("test_date", DataType::Date)
                .column("test_datetime", DataType::DateTime)
                .column("valid_score", DataType::Bool),
        )
    }

    fn builder(dialect: Dialect) -> Builder {
        let now = NaiveDate::from_ymd_opt(2020, 1, 14)
            .unwrap()
            .and_hms_opt(9, 21, 34)
            .unwrap();
        Builder::new(schema(), dialect).with_now(now)
    }

    /// Each line is `expression -> expected sql`. Blank lines and `#`
    /// comments are skipped.
    fn check_good(b: &Builder, options: &ParseOptions, examples: &str) {
        for line in examples.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (field, expected) = line.rsplit_once("->").unwrap();
            let resp = b
                .parse(field.trim(), options)
                .unwrap_or_else(|e| panic!("{field} failed:\n{e}"));
            assert_eq!(
                resp.expression.to_sql(b.dialect()),
                expected.trim(),
                "for {}",
                field.trim()
            );
        }
    }

    /// Blocks separated by `===`, each `expression ->` then the error text.
    fn check_bad(b: &Builder, options: &ParseOptions, examples: &str) {
        for block in examples.split("===") {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            let (field, expected) = block.split_once("->").unwrap();
            let err = b.parse(field.trim(), options).unwrap_err();
            assert_eq!(err.to_string(), expected.trim(), "for {}", field.trim());
        }
    }

    #[test]
    fn fields_and_addition() {
        check_good(
            &builder(Dialect::Sqlite),
            &ParseOptions::default(),
            r#"
            [score]                         -> datatypes.score
            [ScORE]                         -> datatypes.score
            [ScORE] + [ScORE]               -> datatypes.score + datatypes.score
            [score] + 2.0                   -> datatypes.score + 2.0
            substr([department], 5)         -> substr(datatypes.department, 5)
            substr([department], 5, 2)      -> substr(datatypes.department, 5, 2)
            [username] + [department]       -> datatypes.username || datatypes.department
            "foo" + [department]            -> 'foo' || datatypes.department
            1.0 + [score]                   -> 1.0 + datatypes.score
            1.0 + [score] + [score]         -> 1.0 + datatypes.score + datatypes.score
            -0.1 * [score] + 600            -> -0.1 * datatypes.score + 600
            -0.1 * [score] + 600.0          -> -0.1 * datatypes.score + 600.0
            [score] = [score]               -> datatypes.score = datatypes.score
            [score] >= 2.0                  -> datatypes.score >= 2.0
            2.0 <= [score]                  -> datatypes.score >= 2.0
            NOT [score] >= 2.0              -> datatypes.score < 2.0
            NOT 2.0 <= [score]              -> datatypes.score < 2.0
            [score] > 3 AND true            -> datatypes.score > 3
            [valid_score] AND [score] > 3   -> datatypes.valid_score AND datatypes.score > 3
            [valid_score] = TRUE AND [score] > 3 -> datatypes.valid_score = true AND datatypes.score > 3
            ([valid_score] = TRUE) AND [score] > 3 -> datatypes.valid_score = true AND datatypes.score > 3
            [score] = Null                  -> datatypes.score IS NULL
            [score] IS NULL                 -> datatypes.score IS NULL
            [score] != Null                 -> datatypes.score IS NOT NULL
            [score] <> Null                 -> datatypes.score IS NOT NULL
            [score] IS NOT nULL             -> datatypes.score IS NOT NULL
            [department] like "foo"         -> datatypes.department LIKE '%foo%'
            [department] ilike "foo%"       -> lower(datatypes.department) LIKE lower('foo%')
            "F" + [department] ILIKE "f__"  -> lower('F' || datatypes.department) LIKE lower('f__')
            string([score])                 -> CAST(datatypes.score AS VARCHAR)
            coalesce([score], 0.14)         -> coalesce(datatypes.score, 0.14)
            int([department])               -> CAST(datatypes.department AS INTEGER)
            coalesce([department], "moo")   -> coalesce(datatypes.department, 'moo')
            coalesce([test_date], date("2020-01-01"))   -> coalesce(datatypes.test_date, '2020-01-01')
            "#,
        );
    }

    #[test]
    fn division_and_math() {
        check_good(
            &builder(Dialect::Sqlite),
            &ParseOptions::default(),
            r#"
            [score] / 2                      -> CAST(datatypes.score AS FLOAT) / 2
            [score] / 2.0                    -> CAST(datatypes.score AS FLOAT) / 2.0
            sum([score]) / count(*)          -> CASE WHEN (count(*) = 0) THEN NULL ELSE CAST(sum(datatypes.score) AS FLOAT) / CAST(count(*) AS FLOAT) END
            [score] / 1                      -> datatypes.score
            sum([score] / 1)                 -> sum(datatypes.score)
            sum([score] / [score])           -> sum(CASE WHEN (datatypes.score = 0) THEN NULL ELSE CAST(datatypes.score AS FLOAT) / CAST(datatypes.score AS FLOAT) END)
            [score] / (2/1)                  -> CAST(datatypes.score AS FLOAT) / 2
            [score] / (0.5/0.25)             -> CAST(datatypes.score AS FLOAT) / 2.0
            [score] * (2*3)                  -> datatypes.score * 6
            [score] * (2*[score])            -> datatypes.score * 2 * datatypes.score
            [score] * (2 / [score])          -> datatypes.score * CASE WHEN (datatypes.score = 0) THEN NULL ELSE 2 / CAST(datatypes.score AS FLOAT) END
            [score] / (10-7)                 -> CAST(datatypes.score AS FLOAT) / 3
            [score] / (10-9)                 -> datatypes.score
            ([score] + [score]) / ([score] - [score]) -> CASE WHEN (datatypes.score - datatypes.score = 0) THEN NULL ELSE CAST(datatypes.score + datatypes.score AS FLOAT) / CAST(datatypes.score - datatypes.score AS FLOAT) END
            [score] + (3 + 5 / (10 - 5))     -> datatypes.score + 4.0
            [score] + (3 + 5 / 10 - 5)       -> datatypes.score + -1.5
            "#,
        );
    }

    #[test]
    fn arrays() {
        check_good(
            &builder(Dialect::Sqlite),
            &ParseOptions::default(),
            r#"
            [score] NOT in (1,2,3)            -> (datatypes.score NOT IN (1, 2, 3))
            [score] In (1,2,   3.0)           -> datatypes.score IN (1, 2, 3)
            [score] In (1)                    -> datatypes.score IN (1)
            NOT [score] In (1)                -> (datatypes.score NOT IN (1))
            NOT NOT [score] In (1)            -> datatypes.score IN (1)
            [department] In ("A", "B")        -> datatypes.department IN ('A', 'B')
            [department] In ("A", "B",)       -> datatypes.department IN ('A', 'B')
            [department] iN  (  "A",    "B" ) -> datatypes.department IN ('A', 'B')
            [department] In ("A",)            -> datatypes.department IN ('A')
            [department] + [username] In ("A", "B") -> datatypes.department || datatypes.username IN ('A', 'B')
            "#,
        );
    }

    #[test]
    fn booleans() {
        check_good(
            &builder(Dialect::Sqlite),
            &ParseOptions::default(),
            r#"
            [score] > 3                                     -> datatypes.score > 3
            [department] > "b"                              -> datatypes.department > 'b'
            string([score]) like "9_"                       -> CAST(datatypes.score AS VARCHAR) LIKE '9_'
            [score] > 3 AND [score] < 5 AND [score] = 4     -> datatypes.score > 3 AND datatypes.score < 5 AND datatypes.score = 4
            [score] > 3 AND False                           -> false
            NOT [score] > 3 AND [score] < 5                 -> NOT (datatypes.score > 3 AND datatypes.score < 5)
            NOT ([score] > 3 AND [score] < 5)               -> NOT (datatypes.score > 3 AND datatypes.score < 5)
            (NOT [score] > 3) AND [score] < 5               -> datatypes.score <= 3 AND datatypes.score < 5
            NOT [score] > 3 AND NOT [score] < 5             -> NOT (datatypes.score > 3 AND datatypes.score >= 5)
            [score] > 3 AND [score] < 5 OR [score] = 4      -> datatypes.score > 3 AND datatypes.score < 5 OR datatypes.score = 4
            [score] > 3 AND ([score] < 5 OR [score] = 4)    -> datatypes.score > 3 AND (datatypes.score < 5 OR datatypes.score = 4)
            [score] > 3 AND ([score] < 5 OR [score] = 4) AND [score] = 3 -> datatypes.score > 3 AND (datatypes.score < 5 OR datatypes.score = 4) AND datatypes.score = 3
            [score] between 1 and 3                         -> datatypes.score BETWEEN 1 AND 3
            [username] between [department] and "z"         -> datatypes.username BETWEEN datatypes.department AND 'z'
            count_distinct([score] > 80)                    -> count(DISTINCT (datatypes.score > 80))
            count([score] > 80)                             -> count(datatypes.score > 80)
            "#,
        );
    }

    #[test]
    fn invalid_expressions() {
        check_bad(
            &builder(Dialect::Sqlite),
            &ParseOptions::default(),
            r#"
unknown ->
unknown is not a valid column name

unknown
^
===
[scores] + -1.0 ->
scores is not a valid column name

[scores] + -1.0
 ^
unknown_col and num can not be added together

[scores] + -1.0
 ^
===
2.0 + [scores] ->
scores is not a valid column name

2.0 + [scores]
       ^
num and unknown_col can not be added together

2.0 + [scores]
^
===
[username]-[score] ->
string and num can not be subtracted

[username]-[score]
 ^
===
[score] * [username] ->
num and string can not be multiplied together

[score] * [username]
 ^
===
[score] = "5" ->
Can't compare num to str

[score] = "5"
 ^
===
[department] In ("A", 2) ->
An array may not contain both strings and numbers

[department] In ("A", 2)
                 ^
===
[username] NOT IN (2, "B") ->
An array may not contain both strings and numbers

[username] NOT IN (2, "B")
                   ^
===
1 in (1,2,3) ->
Must be a column or expression

1 in (1,2,3)
^
===
NOT [department] ->
NOT requires a boolean value

NOT [department]
^
===
[score] / (10-10) ->
When dividing, the denominator can not be zero
===
avg([test_date]) ->
A date can not be aggregated using avg.

avg([test_date])
^
"#,
        );
    }

    #[test]
    fn literals_are_not_expressions() {
        let b = builder(Dialect::Sqlite);
        for text in [r#""22""#, "2.0", "2.0 + 1.0", r#""220" + "foo""#, "5"] {
            assert_eq!(
                b.parse(text, &ParseOptions::default()).unwrap_err(),
                ExpressionError::ConstantValue,
                "for {text}"
            );
        }
    }

    #[test]
    fn dates() {
        check_good(
            &builder(Dialect::Sqlite),
            &ParseOptions::default(),
            r#"
            [test_date] > date("2020-01-01")     -> datatypes.test_date > '2020-01-01'
            [test_date] > date("today")          -> datatypes.test_date > '2020-01-14'
            date("today") < [test_date]          -> datatypes.test_date > '2020-01-14'
            [test_date] > date("1 day ago")      -> datatypes.test_date > '2020-01-13'
            [test_date] between date("2020-01-01") and date("2020-01-30") -> datatypes.test_date BETWEEN '2020-01-01' AND '2020-01-30'
            [test_date] IS last year             -> datatypes.test_date BETWEEN '2019-01-01' AND '2019-12-31'
            [test_datetime] > date("1 days ago") -> datatypes.test_datetime > '2020-01-13 09:21:34'
            [test_datetime] between date("2020-01-01") and date("2020-01-30") -> datatypes.test_datetime BETWEEN '2020-01-01 00:00:00' AND '2020-01-30 23:59:59.999999'
            [test_datetime] IS next year         -> datatypes.test_datetime BETWEEN '2021-01-01 00:00:00' AND '2021-12-31 23:59:59.999999'
            [test_date] > "1 days ago"           -> datatypes.test_date > '2020-01-13'
            [test_date] between "30 days ago" and "now" -> datatypes.test_date BETWEEN '2019-12-15' AND '2020-01-14'
            [test_datetime] between date("30 days ago") and date("now") -> datatypes.test_datetime BETWEEN '2019-12-15 09:21:34' AND '2020-01-14 09:21:34'
            "#,
        );
        check_bad(
            &builder(Dialect::Sqlite),
            &ParseOptions::default(),
            r#"
[test_date] > date("1 day from now") ->
Can't convert '1 day from now' to a date.
===
[test_date] between date("2020-01-01") and 7 ->
When using between, the column (date) and between values (date, num) must be the same data type.

[test_date] between date("2020-01-01") and 7
 ^
===
[test_date] between "potato" and date("2020-01-01") ->
Can't convert 'potato' to a date.
"#,
        );
    }

    #[test]
    fn bigquery_truncation() {
        check_good(
            &builder(Dialect::Bigquery),
            &ParseOptions::default(),
            r#"
            month([test_date]) > date("2020-12-30")      -> date_trunc(datatypes.test_date, month) > '2020-12-30'
            month([test_datetime]) > date("2020-12-30")  -> datetime(timestamp_trunc(datatypes.test_datetime, month)) > '2020-12-30'
            date("2020-12-30") < month([test_datetime])  -> datetime(timestamp_trunc(datatypes.test_datetime, month)) > '2020-12-30'
            week([test_date]) > date("2020-12-30")       -> date_trunc(datatypes.test_date, week(monday)) > '2020-12-30'
            date([test_datetime])                        -> datetime(timestamp_trunc(datatypes.test_datetime, day))
            "#,
        );
    }

    #[test]
    fn aggregations() {
        check_good(
            &builder(Dialect::Sqlite),
            &ParseOptions::default(),
            r#"
            sum([score]*2.0)                  -> sum(datatypes.score * 2.0)
            min([test_date])                  -> min(datatypes.test_date)
            max([score]) - min([score])       -> max(datatypes.score) - min(datatypes.score)
            count_distinct([department])      -> count(DISTINCT datatypes.department)
            count_distinct([department] = "MO" AND [score] > 20) -> count(DISTINCT (datatypes.department = 'MO' AND datatypes.score > 20))
            count_distinct(if([department] = "MO" AND [score] > 20, [department])) -> count(DISTINCT CASE WHEN (datatypes.department = 'MO' AND datatypes.score > 20) THEN datatypes.department END)
            count(*)                          -> count(*)
            "#,
        );
        check_bad(
            &builder(Dialect::Sqlite),
            &ParseOptions::default(),
            r#"
sum([score]) + sum([department]) ->
A str can not be aggregated using sum.

sum([score]) + sum([department])
               ^
===
percentile13([score]) ->
Percentile values of 13 are not supported.

percentile13([score])
^
Percentile is not supported on sqlite

percentile13([score])
^
"#,
        );
    }

    #[test]
    fn forbidden_aggregation_reported_once() {
        check_bad(
            &builder(Dialect::Sqlite),
            &ParseOptions::forbid_aggregation(),
            r#"
sum([score]) + sum([department]) ->
Aggregations are not allowed in this field.

sum([score]) + sum([department])
^
A str can not be aggregated using sum.

sum([score]) + sum([department])
               ^
===
2.1235 + sum([department]) ->
A str can not be aggregated using sum.

2.1235 + sum([department])
         ^
"#,
        );
    }

    #[test]
    fn percentiles_outside_sqlite() {
        check_good(
            &builder(Dialect::Postgresql),
            &ParseOptions::default(),
            r#"
            percentile25([score])  -> percentile_cont(0.25) WITHIN GROUP (ORDER BY datatypes.score)
            median([score])        -> percentile_cont(0.5) WITHIN GROUP (ORDER BY datatypes.score)
            "#,
        );
    }

    #[test]
    fn enforce_aggregation_wraps_numbers() {
        let opts = ParseOptions::enforce_aggregation();
        check_good(
            &builder(Dialect::Sqlite),
            &opts,
            r#"
            [ScORE] + [ScORE]           -> sum(datatypes.score + datatypes.score)
            max([ScORE] + [ScORE])      -> max(datatypes.score + datatypes.score)
            [department]                -> datatypes.department
            "#,
        );
        let b = builder(Dialect::Sqlite);
        assert!(b.parse("[score]", &opts).unwrap().is_aggregate);
        assert!(!b.parse("[score]", &ParseOptions::default()).unwrap().is_aggregate);
    }

    #[test]
    fn date_conversions() {
        let opts = ParseOptions {
            enforce_aggregation: true,
            convert_dates_with: Some("month_conv".into()),
            ..ParseOptions::default()
        };
        check_good(
            &builder(Dialect::Postgresql),
            &opts,
            r#"
            [test_date]                                -> date_trunc('month', datatypes.test_date)
            coalesce([test_date], date("2020-01-01"))  -> coalesce(date_trunc('month', datatypes.test_date), '2020-01-01')
            "#,
        );
        let opts = ParseOptions {
            convert_dates_with: Some("a_potato".into()),
            ..ParseOptions::default()
        };
        check_good(&builder(Dialect::Postgresql), &opts, "[test_date] -> datatypes.test_date");
    }

    #[test]
    fn if_statements() {
        check_good(
            &builder(Dialect::Sqlite),
            &ParseOptions::default(),
            r#"
            if([valid_score], [score], -1)              -> CASE WHEN datatypes.valid_score THEN datatypes.score ELSE -1 END
            if([score] > 2, [score]) + if([score] > 4, 1) -> CASE WHEN (datatypes.score > 2) THEN datatypes.score END + CASE WHEN (datatypes.score > 4) THEN 1 END
            if([score] > 2, null, [score] > 4, [score]*2.0, NULL) -> CASE WHEN (datatypes.score > 2) THEN NULL WHEN (datatypes.score > 4) THEN datatypes.score * 2.0 END
            if([score] > 2 OR [score] = 1, [score]*3.5) -> CASE WHEN (datatypes.score > 2 OR datatypes.score = 1) THEN datatypes.score * 3.5 END
            if([score] > 2, "XDR-Radiology", "OTHERS") + [department] -> CASE WHEN (datatypes.score > 2) THEN 'XDR-Radiology' ELSE 'OTHERS' END || datatypes.department
            if([score] > 2, NULL, "OTHERS") + [department] -> CASE WHEN (datatypes.score > 2) THEN NULL ELSE 'OTHERS' END || datatypes.department
            if([test_datetime] > date("2020-01-01"), [test_datetime]) -> CASE WHEN (datatypes.test_datetime > '2020-01-01 00:00:00') THEN datatypes.test_datetime END
            if(([score])<2,"babies",([score])<13,"children","oldsters") -> CASE WHEN (datatypes.score < 2) THEN 'babies' WHEN (datatypes.score < 13) THEN 'children' ELSE 'oldsters' END
            "#,
        );
        check_bad(
            &builder(Dialect::Sqlite),
            &ParseOptions::default(),
            r#"
if([department], [score]) ->
This should be a boolean column or expression

if([department], [score])
    ^
===
if([department] = 2, [score]) ->
Can't compare str to num

if([department] = 2, [score])
    ^
===
if([department] = "1", [score], [valid_score], [score]*2, [department], 12.5) ->
This should be a boolean column or expression

if([department] = "1", [score], [valid_score], [score]*2, [department], 12.5)
                                                           ^
===
if([department] = "foo", [score], [valid_score], [department]) ->
The values in this if statement must be the same type, not num and str

if([department] = "foo", [score], [valid_score], [department])
                                                  ^
"#,
        );
    }

    #[test]
    fn datatypes() {
        let b = builder(Dialect::Sqlite);
        for (text, expected) in [
            ("[score]", DataType::Num),
            ("[department] > \"foo\" anD [score] < 22", DataType::Bool),
            ("day([test_date])", DataType::Date),
            ("month([test_datetime])", DataType::Date),
            ("min([department])", DataType::Str),
            ("count(*)", DataType::Num),
            ("substr([department], 5, 5)", DataType::Str),
        ] {
            let resp = b.parse(text, &ParseOptions::default()).unwrap();
            assert_eq!(resp.datatype, expected, "for {text}");
        }
    }

    #[test]
    fn totals_render_with_filters() {
        let b = builder(Dialect::Sqlite);
        let resp = b
            .parse("sum([score]) / {{ sum([score]) }}", &ParseOptions::default())
            .unwrap();
        let filters = vec!["datatypes.score > 1".to_string()];
        assert_eq!(
            resp.to_sql(&RenderContext::with_filters(Dialect::Sqlite, &filters)),
            "CASE WHEN ((SELECT sum(datatypes.score) FROM datatypes WHERE datatypes.score > 1) = 0) \
             THEN NULL ELSE CAST(sum(datatypes.score) AS FLOAT) / \
             CAST((SELECT sum(datatypes.score) FROM datatypes WHERE datatypes.score > 1) AS FLOAT) END"
        );
    }

    #[test]
    fn totals_are_allowed_when_aggregation_is_forbidden() {
        let b = builder(Dialect::Sqlite);
        let resp = b
            .parse("[score] / {{ max([score]) }}", &ParseOptions::forbid_aggregation())
            .unwrap();
        assert!(!resp.is_aggregate);
    }

    #[test]
    fn results_are_memoized() {
        let b = builder(Dialect::Sqlite);
        let first = b.parse("[score] + 1", &ParseOptions::default()).unwrap();
        let second = b.parse("[score] + 1", &ParseOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let other = b.parse("[score] + 1", &ParseOptions::enforce_aggregation()).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn relative_dates_follow_local_time() {
        let b = Builder::new(schema(), Dialect::Sqlite);
        let opts = ParseOptions::default();
        let first = b.parse("[test_date] IS last year", &opts).unwrap();
        let second = b.parse("[test_date] IS last year", &opts).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        let plain = b.parse("[score] + 1", &opts).unwrap();
        assert!(Arc::ptr_eq(&plain, &b.parse("[score] + 1", &opts).unwrap()));

        // A fixed clock makes them cacheable again.
        let fixed = builder(Dialect::Sqlite);
        let first = fixed.parse("[test_date] IS last year", &opts).unwrap();
        assert!(Arc::ptr_eq(&first, &fixed.parse("[test_date] IS last year", &opts).unwrap()));
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let b = builder(Dialect::Sqlite);
        let huge = "9".repeat(400);
        let big = "9".repeat(200);
        for text in [format!("[score] + {huge}"), format!("[score] * ({big} * {big})")] {
            let err = b.parse(&text, &ParseOptions::default()).unwrap_err();
            assert!(err.to_string().contains("Numbers must be finite"), "{text}: {err}");
        }
    }
}
