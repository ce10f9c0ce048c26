//! Structured filters: conditions built from plain values.
//!
//! `build_filter` turns a value (or list of values) and an operator into a
//! boolean [`SqlExpr`] on an ingredient. Automatic filters use it with keys
//! such as `state` or `age__gt`.

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use recipe_core::DataType;
use recipe_expression::sql::{CastType, CompareOp};
use recipe_expression::{Literal, SqlExpr};
use recipe_timeparsing::parse_datetime;
use serde_json::Value as JsonValue;

use crate::error::{RecipeError, Result};
use crate::ingredient::Ingredient;

/// Operators accepted by [`build_filter`] and in automatic filter keys.
pub const ALLOWED_OPERATORS: &[&str] = &[
    "eq",
    "ne",
    "lt",
    "lte",
    "gt",
    "gte",
    "is",
    "isnot",
    "like",
    "ilike",
    "quickselect",
    "in",
    "notin",
    "between",
    "and",
];

/// Split an automatic filter key into an ingredient id and an operator.
///
/// `age__gt` gives `("age", Some("gt"))`. A suffix that is not an operator
/// stays part of the id.
pub fn parse_filter_key(key: &str) -> (&str, Option<&str>) {
    if let Some((id, op)) = key.rsplit_once("__") {
        if ALLOWED_OPERATORS.contains(&op) {
            return (id, Some(op));
        }
    }
    (key, None)
}

/// Build a filter on `ingredient` from `value`.
///
/// Lists default to `in` and scalars to `eq`. Values for date and datetime
/// ingredients are parsed relative to `now`.
pub fn build_filter(
    ingredient: &Ingredient,
    value: &JsonValue,
    operator: Option<&str>,
    now: NaiveDateTime,
) -> Result<SqlExpr> {
    match value {
        JsonValue::Array(values) => {
            build_vector_filter(ingredient, values, operator.unwrap_or("in"), now)
        }
        _ => build_scalar_filter(ingredient, value, operator.unwrap_or("eq"), now),
    }
}

fn unknown_operator(op: &str) -> RecipeError {
    RecipeError::bad_filter(format!("Unknown operator {op}"))
}

fn is_nested_condition(v: &JsonValue) -> bool {
    v.get("operator").is_some() && v.get("value").is_some()
}

fn build_nested(ingredient: &Ingredient, cond: &JsonValue, now: NaiveDateTime) -> Result<SqlExpr> {
    let operator = cond
        .get("operator")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| RecipeError::bad_filter("Nested conditions need an operator and a value"))?;
    build_filter(ingredient, &cond["value"], Some(operator), now)
}

fn quickselect(ingredient: &Ingredient, name: &JsonValue) -> Result<SqlExpr> {
    let name = match name {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    ingredient.quickselect(&name).cloned().ok_or_else(|| {
        RecipeError::bad_filter(format!(
            "quickselect {name} was not found in ingredient {}",
            ingredient.id
        ))
    })
}

/// Convert a filter value for a column of `datatype`.
fn to_literal(value: &JsonValue, datatype: DataType, now: NaiveDateTime) -> Result<Literal> {
    Ok(match value {
        JsonValue::Null => Literal::Null,
        JsonValue::Bool(b) => Literal::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Literal::Int(i),
            None => Literal::Float(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) if datatype.is_temporal() => {
            let dt = parse_datetime(s, now).map_err(|e| RecipeError::bad_filter(e.to_string()))?;
            if datatype == DataType::Date {
                Literal::Date(dt.date())
            } else {
                Literal::DateTime(dt)
            }
        }
        JsonValue::String(s) => Literal::Str(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => {
            return Err(RecipeError::bad_filter(format!(
                "Can't filter {} on {value}",
                datatype
            )));
        }
    })
}

/// The column to compare against, cast to `VARCHAR` when a string is
/// compared with a non-string ingredient.
fn filter_column(ingredient: &Ingredient, string_values: bool) -> SqlExpr {
    let column = ingredient.value().expression.clone();
    if string_values && ingredient.datatype() != DataType::Str {
        SqlExpr::cast(column, CastType::Varchar)
    } else {
        column
    }
}

fn lit(l: Literal) -> SqlExpr {
    SqlExpr::Literal(l)
}

fn is_null(expr: SqlExpr, negated: bool) -> SqlExpr {
    SqlExpr::IsNull {
        expr: Box::new(expr),
        negated,
    }
}

fn build_scalar_filter(
    ingredient: &Ingredient,
    value: &JsonValue,
    operator: &str,
    now: NaiveDateTime,
) -> Result<SqlExpr> {
    match operator {
        "quickselect" => return quickselect(ingredient, value),
        "like" | "ilike" => {
            let pattern = match value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            let column = filter_column(ingredient, true);
            let pattern = lit(Literal::Str(pattern));
            return Ok(if operator == "like" {
                SqlExpr::compare(CompareOp::Like, column, pattern)
            } else {
                SqlExpr::compare(
                    CompareOp::Like,
                    SqlExpr::func("lower", vec![column]),
                    SqlExpr::func("lower", vec![pattern]),
                )
            });
        }
        _ => {}
    }

    let literal = to_literal(value, ingredient.datatype(), now)?;
    let null = literal == Literal::Null;
    let column = filter_column(ingredient, matches!(literal, Literal::Str(_)));
    let compare = |op| Ok(SqlExpr::compare(op, column.clone(), lit(literal.clone())));

    match operator {
        "eq" | "is" if null => Ok(is_null(column.clone(), false)),
        "ne" | "isnot" if null => Ok(is_null(column.clone(), true)),
        "eq" | "is" => compare(CompareOp::Eq),
        "ne" | "isnot" => compare(CompareOp::Ne),
        "lt" => compare(CompareOp::Lt),
        "lte" => compare(CompareOp::Lte),
        "gt" => compare(CompareOp::Gt),
        "gte" => compare(CompareOp::Gte),
        other => Err(unknown_operator(other)),
    }
}

fn build_vector_filter(
    ingredient: &Ingredient,
    values: &[JsonValue],
    operator: &str,
    now: NaiveDateTime,
) -> Result<SqlExpr> {
    match operator {
        "and" => {
            let conditions = values
                .iter()
                .map(|v| build_nested(ingredient, v, now))
                .collect::<Result<Vec<_>>>()?;
            Ok(SqlExpr::and_all(conditions))
        }
        "in" | "notin" => {
            let has_null = values.iter().any(JsonValue::is_null);
            let (nested, simple): (Vec<&JsonValue>, Vec<&JsonValue>) = values
                .iter()
                .filter(|v| !v.is_null())
                .partition(|v| is_nested_condition(v));

            // Sorted so the same filter always renders the same SQL.
            let mut literals = simple
                .into_iter()
                .map(|v| to_literal(v, ingredient.datatype(), now))
                .collect::<Result<Vec<_>>>()?;
            literals.sort_by(literal_order);

            let column = filter_column(
                ingredient,
                literals.iter().any(|l| matches!(l, Literal::Str(_))),
            );
            let in_list = |list: Vec<Literal>| SqlExpr::InList {
                expr: Box::new(column.clone()),
                list: list.into_iter().map(lit).collect(),
                negated: false,
            };

            let cond = if has_null || !nested.is_empty() {
                let mut conditions = Vec::new();
                if has_null {
                    conditions.push(is_null(column.clone(), false));
                }
                if !literals.is_empty() {
                    conditions.push(in_list(literals));
                }
                for cond in nested {
                    conditions.push(build_nested(ingredient, cond, now)?);
                }
                SqlExpr::or_all(conditions)
            } else if literals.is_empty() {
                lit(Literal::Bool(false))
            } else {
                in_list(literals)
            };

            Ok(if operator == "notin" { cond.negate() } else { cond })
        }
        "between" => {
            let [low, high] = values else {
                return Err(RecipeError::bad_filter(
                    "When using between, you can only supply a lower and upper bounds.",
                ));
            };
            let low = to_literal(low, ingredient.datatype(), now)?;
            let high = to_literal(high, ingredient.datatype(), now)?;
            let strings = matches!(low, Literal::Str(_)) || matches!(high, Literal::Str(_));
            Ok(SqlExpr::Between {
                expr: Box::new(filter_column(ingredient, strings)),
                low: Box::new(lit(low)),
                high: Box::new(lit(high)),
            })
        }
        "quickselect" => {
            let conditions = values
                .iter()
                .map(|name| quickselect(ingredient, name))
                .collect::<Result<Vec<_>>>()?;
            Ok(SqlExpr::or_all(conditions))
        }
        other => Err(unknown_operator(other)),
    }
}

/// Total order over filter literals: by kind, then by value.
fn literal_order(a: &Literal, b: &Literal) -> Ordering {
    fn rank(l: &Literal) -> u8 {
        match l {
            Literal::Null => 0,
            Literal::Bool(_) => 1,
            Literal::Int(_) | Literal::Float(_) => 2,
            Literal::Str(_) => 3,
            Literal::Date(_) => 4,
            Literal::DateTime(_) => 5,
        }
    }
    match (a, b) {
        (Literal::Bool(x), Literal::Bool(y)) => x.cmp(y),
        (Literal::Str(x), Literal::Str(y)) => x.cmp(y),
        (Literal::Date(x), Literal::Date(y)) => x.cmp(y),
        (Literal::DateTime(x), Literal::DateTime(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use recipe_core::{Dialect, TableSchema};
    use recipe_expression::Builder;
    use serde_json::json;

    use super::*;
    use crate::parser::parse_yaml;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 14)
            .unwrap()
            .and_hms_opt(9, 21, 34)
            .unwrap()
    }

    fn ingredient(id: &str) -> Ingredient {
        let builder = Builder::new(
            Arc::new(
                TableSchema::new("census")
                    .column("state", DataType::Str)
                    .column("age", DataType::Num)
                    .column("birth_date", DataType::Date)
                    .column("updated_at", DataType::DateTime),
            ),
            Dialect::Sqlite,
        )
        .with_now(now());
        let def = parse_yaml(
            r#"
state:
  field: '[state]'
  quickselects:
    - {name: vt, condition: '[state] = "Vermont"'}
    - {name: me, condition: '[state] = "Maine"'}
age: '[age]'
birth_date: '[birth_date]'
updated_at: '[updated_at]'
"#,
        )
        .unwrap();
        let spec = def.get(id).unwrap().clone().into_spec();
        Ingredient::build(id, spec, &builder, &def).unwrap()
    }

    fn sql(id: &str, value: JsonValue, op: Option<&str>) -> String {
        build_filter(&ingredient(id), &value, op, now())
            .unwrap_or_else(|e| panic!("{id} {value} {op:?}: {e}"))
            .to_string()
    }

    fn err(id: &str, value: JsonValue, op: Option<&str>) -> String {
        build_filter(&ingredient(id), &value, op, now())
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn filter_keys() {
        assert_eq!(parse_filter_key("state"), ("state", None));
        assert_eq!(parse_filter_key("age__gt"), ("age", Some("gt")));
        assert_eq!(parse_filter_key("first__name"), ("first__name", None));
        assert_eq!(parse_filter_key("first__name__notin"), ("first__name", Some("notin")));
    }

    #[test]
    fn scalar_filters() {
        assert_eq!(sql("state", json!("Vermont"), None), "census.state = 'Vermont'");
        assert_eq!(sql("state", json!(null), None), "census.state IS NULL");
        assert_eq!(sql("state", json!(null), Some("isnot")), "census.state IS NOT NULL");
        assert_eq!(sql("state", json!("Vermont"), Some("ne")), "census.state != 'Vermont'");
        assert_eq!(sql("age", json!(30), Some("gt")), "census.age > 30");
        assert_eq!(sql("age", json!(2.5), Some("lte")), "census.age <= 2.5");
        assert_eq!(
            sql("age", json!("30"), None),
            "CAST(census.age AS VARCHAR) = '30'"
        );
    }

    #[test]
    fn pattern_filters() {
        assert_eq!(sql("state", json!("Ver%"), Some("like")), "census.state LIKE 'Ver%'");
        assert_eq!(
            sql("state", json!("ver%"), Some("ilike")),
            "lower(census.state) LIKE lower('ver%')"
        );
    }

    #[test]
    fn list_filters() {
        assert_eq!(
            sql("state", json!(["Vermont", "Alabama"]), None),
            "census.state IN ('Alabama', 'Vermont')"
        );
        assert_eq!(sql("age", json!([40, 3, 12]), None), "census.age IN (3, 12, 40)");
        assert_eq!(
            sql("state", json!(["Vermont"]), Some("notin")),
            "(census.state NOT IN ('Vermont'))"
        );
        assert_eq!(sql("state", json!([]), None), "false");
    }

    #[test]
    fn complex_list_filters() {
        assert_eq!(
            sql(
                "state",
                json!([null, "Vermont", {"operator": "like", "value": "Ten%"}]),
                None
            ),
            "census.state IS NULL OR census.state IN ('Vermont') OR census.state LIKE 'Ten%'"
        );
        assert_eq!(
            sql("state", json!([null, "Vermont"]), Some("notin")),
            "NOT (census.state IS NULL OR census.state IN ('Vermont'))"
        );
    }

    #[test]
    fn between_and_and() {
        assert_eq!(
            sql("age", json!([20, 40]), Some("between")),
            "census.age BETWEEN 20 AND 40"
        );
        assert_eq!(
            err("age", json!([20]), Some("between")),
            "When using between, you can only supply a lower and upper bounds."
        );
        assert_eq!(
            sql(
                "age",
                json!([{"operator": "gt", "value": 20}, {"operator": "lt", "value": 40}]),
                Some("and")
            ),
            "census.age > 20 AND census.age < 40"
        );
    }

    #[test]
    fn quickselects() {
        assert_eq!(
            sql("state", json!("vt"), Some("quickselect")),
            "census.state = 'Vermont'"
        );
        assert_eq!(
            sql("state", json!(["vt", "me"]), Some("quickselect")),
            "census.state = 'Vermont' OR census.state = 'Maine'"
        );
        assert_eq!(
            err("state", json!("nh"), Some("quickselect")),
            "quickselect nh was not found in ingredient state"
        );
    }

    #[test]
    fn dates_are_converted() {
        assert_eq!(
            sql("birth_date", json!("2020-01-01"), None),
            "census.birth_date = '2020-01-01'"
        );
        assert_eq!(
            sql("birth_date", json!("1 day ago"), Some("gte")),
            "census.birth_date >= '2020-01-13'"
        );
        assert_eq!(
            sql("updated_at", json!("2020-01-01 10:00:00"), Some("lt")),
            "census.updated_at < '2020-01-01 10:00:00'"
        );
        assert_eq!(
            err("birth_date", json!("potato"), None),
            "Can't convert 'potato' to a date."
        );
    }

    #[test]
    fn unknown_operators() {
        assert_eq!(err("state", json!("x"), Some("frob")), "Unknown operator frob");
        assert_eq!(err("state", json!(["x"]), Some("eq")), "Unknown operator eq");
    }
}
