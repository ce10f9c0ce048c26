//! [`Recipe`] -- a fluent query over a shelf.
//!
//! A recipe collects ingredient ids, filters and paging, then brews them
//! into a [`BrewedQuery`] that renders one SQL statement:
//!
//! ```text
//! SELECT .. FROM .. [WHERE ..] [GROUP BY ..] [HAVING ..] [ORDER BY ..] [LIMIT n] [OFFSET m]
//! ```
//!
//! Late-bound `{{ }}` totals in selected columns and havings repeat the
//! recipe's WHERE conditions, so they are rendered only once the whole
//! recipe is known.

use std::collections::HashSet;
use std::sync::Arc;

use recipe_core::{DataType, Dataset, Dialect, RecipeRow, Value, is_valid_column};
use recipe_expression::{ParseOptions, RenderContext, SqlExpr};
use recipe_storage::DbInfo;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::enchant::Enchanter;
use crate::error::{RecipeError, Result};
use crate::filters::{build_filter, parse_filter_key};
use crate::ingredient::{Ingredient, Role};
use crate::shelf::Shelf;
use crate::types::{IngredientKind, SortDirection};

// ---------------------------------------------------------------------------
// BrewedQuery
// ---------------------------------------------------------------------------

/// A labelled select column.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub label: String,
    pub expr: SqlExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub label: String,
    pub descending: bool,
}

/// The parts of a recipe's statement, resolved against the shelf.
#[derive(Debug, Clone)]
pub struct BrewedQuery {
    pub dialect: Dialect,
    pub from: String,
    /// Dimension roles first, then metrics.
    pub columns: Vec<SelectColumn>,
    /// Labels of the dimension columns.
    pub group_by: Vec<String>,
    pub filters: Vec<SqlExpr>,
    pub havings: Vec<SqlExpr>,
    pub order_by: Vec<OrderBy>,
    /// 0 means no limit.
    pub limit: u64,
    pub offset: u64,
    /// Selected ingredients, dimensions first.
    pub ingredients: Vec<Arc<Ingredient>>,
}

impl BrewedQuery {
    /// Render the full statement, one clause per line.
    pub fn to_sql(&self) -> String {
        self.render(true)
    }

    /// The statement without `LIMIT` and `OFFSET`.
    pub fn to_unpaged_sql(&self) -> String {
        self.render(false)
    }

    fn render(&self, paged: bool) -> String {
        let plain = RenderContext::new(self.dialect);
        let wheres: Vec<String> = self
            .filters
            .iter()
            .map(|f| f.render_conjunct(&plain))
            .collect();
        let late = RenderContext::with_filters(self.dialect, &wheres);

        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let label = self.dialect.quote_identifier(&c.label);
                format!("{} AS {label}", c.expr.render(&late))
            })
            .collect();
        let mut lines = vec![
            format!("SELECT {}", columns.join(", ")),
            format!("FROM {}", self.from),
        ];

        if !wheres.is_empty() {
            lines.push(format!("WHERE {}", wheres.join(" AND ")));
        }

        // Group by expressions, not labels: a label that matches a table
        // column would group by the column instead. They must render exactly
        // as selected, totals included.
        let group_by: Vec<String> = self
            .group_by
            .iter()
            .filter_map(|label| self.columns.iter().find(|c| &c.label == label))
            .map(|c| c.expr.render(&late))
            .collect();
        if !group_by.is_empty() {
            lines.push(format!("GROUP BY {}", group_by.join(", ")));
        }

        if !self.havings.is_empty() {
            let havings: Vec<String> = self
                .havings
                .iter()
                .map(|h| h.render_conjunct(&late))
                .collect();
            lines.push(format!("HAVING {}", havings.join(" AND ")));
        }

        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|o| {
                    let label = self.dialect.quote_identifier(&o.label);
                    if o.descending {
                        format!("{label} DESC")
                    } else {
                        label
                    }
                })
                .collect();
            lines.push(format!("ORDER BY {}", keys.join(", ")));
        }

        if paged {
            if self.limit > 0 {
                lines.push(format!("LIMIT {}", self.limit));
            } else if self.offset > 0 && self.dialect == Dialect::Sqlite {
                // SQLite only accepts OFFSET after a LIMIT.
                lines.push("LIMIT -1".to_string());
            }
            if self.offset > 0 {
                lines.push(format!("OFFSET {}", self.offset));
            }
        }

        lines.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// Rows returned by [`Recipe::execute`].
#[derive(Debug, Clone, Serialize)]
pub struct RecipeResult {
    pub from_cache: bool,
    pub rows: Vec<RecipeRow>,
}

/// A query over a [`Shelf`], built up with chained calls.
///
/// ```ignore
/// let rows = Recipe::new(&shelf)
///     .with_dbinfo(dbinfo)
///     .dimensions(["state"])
///     .metrics(["population"])
///     .order_by(["-population"])
///     .limit(10)
///     .all()?;
/// ```
#[derive(Debug, Clone)]
pub struct Recipe<'a> {
    shelf: &'a Shelf,
    dbinfo: Option<Arc<DbInfo>>,
    dimensions: Vec<String>,
    metrics: Vec<String>,
    filters: Vec<String>,
    automatic_filters: Map<String, JsonValue>,
    order_by: Vec<String>,
    limit: u64,
    offset: u64,
    select_from: Option<String>,
    anonymize: bool,
}

fn push_unique<I, S>(list: &mut Vec<String>, items: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for item in items {
        let item = item.into();
        if !list.contains(&item) {
            list.push(item);
        }
    }
}

impl<'a> Recipe<'a> {
    pub fn new(shelf: &'a Shelf) -> Self {
        Self {
            shelf,
            dbinfo: None,
            dimensions: Vec::new(),
            metrics: Vec::new(),
            filters: Vec::new(),
            automatic_filters: Map::new(),
            order_by: Vec::new(),
            limit: 0,
            offset: 0,
            select_from: None,
            anonymize: false,
        }
    }

    // -- Builder -------------------------------------------------------------

    /// Database the recipe executes against.
    pub fn with_dbinfo(mut self, dbinfo: Arc<DbInfo>) -> Self {
        self.dbinfo = Some(dbinfo);
        self
    }

    pub fn dimensions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        push_unique(&mut self.dimensions, ids);
        self
    }

    pub fn metrics<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        push_unique(&mut self.metrics, ids);
        self
    }

    /// Alias for [`Recipe::metrics`].
    pub fn measures<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics(ids)
    }

    /// Shelf filter or having ids, or raw boolean expressions.
    ///
    /// Aggregated conditions go to `HAVING`, everything else to `WHERE`.
    pub fn filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        push_unique(&mut self.filters, filters);
        self
    }

    /// Structured filters keyed by `dimension` or `dimension__operator`.
    /// Later calls override earlier keys.
    pub fn automatic_filters(mut self, filters: Map<String, JsonValue>) -> Self {
        self.automatic_filters.extend(filters);
        self
    }

    /// Ingredient ids to sort by; a leading `-` sorts descending, otherwise
    /// the ingredient's declared `ordering` applies.
    pub fn order_by<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        push_unique(&mut self.order_by, keys);
        self
    }

    /// 0 means no limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Replace the `FROM` clause, for example with a join.
    pub fn select_from(mut self, from: impl Into<String>) -> Self {
        self.select_from = Some(from.into());
        self
    }

    /// Replace values of ingredients flagged `anonymize` in results.
    pub fn anonymize(mut self, anonymize: bool) -> Self {
        self.anonymize = anonymize;
        self
    }

    // -- Brewing -------------------------------------------------------------

    /// Resolve a filter to its condition and whether it is aggregated.
    fn resolve_filter(&self, filter: &str) -> Result<(SqlExpr, bool)> {
        if self.shelf.contains(filter) {
            let ingredient = self
                .shelf
                .find(filter, &[IngredientKind::Filter, IngredientKind::Having])?;
            let aggregate = ingredient.kind == IngredientKind::Having || ingredient.is_aggregate();
            return Ok((ingredient.value().expression.clone(), aggregate));
        }
        if is_valid_column(filter) {
            return Err(RecipeError::missing(filter));
        }
        let response = self
            .shelf
            .parse_expression(filter, &ParseOptions::default())?;
        if response.datatype != DataType::Bool {
            return Err(RecipeError::bad_recipe(format!(
                "{filter} is not a boolean expression"
            )));
        }
        Ok((response.expression.clone(), response.is_aggregate))
    }

    /// Resolve every part of the recipe against the shelf.
    ///
    /// # Errors
    ///
    /// Unknown ids, ids of the wrong kind, broken ingredients, invalid raw
    /// filters, and a recipe with no dimensions or metrics.
    pub fn query(&self) -> Result<BrewedQuery> {
        if self.dimensions.is_empty() && self.metrics.is_empty() {
            return Err(RecipeError::bad_recipe(
                "No ingredients have been added to this recipe",
            ));
        }

        let dimensions = self
            .dimensions
            .iter()
            .map(|id| self.shelf.find(id, &[IngredientKind::Dimension]))
            .collect::<Result<Vec<_>>>()?;
        let metrics = self
            .metrics
            .iter()
            .map(|id| self.shelf.find(id, &[IngredientKind::Metric]))
            .collect::<Result<Vec<_>>>()?;

        let mut columns = Vec::new();
        let mut group_by = Vec::new();
        for dimension in &dimensions {
            for role in &dimension.roles {
                let label = role.role.label(&dimension.id);
                group_by.push(label.clone());
                columns.push(SelectColumn {
                    label,
                    expr: role.response.expression.clone(),
                });
            }
        }
        for metric in &metrics {
            columns.push(SelectColumn {
                label: metric.id.clone(),
                expr: metric.value().expression.clone(),
            });
        }

        let mut filters = Vec::new();
        let mut havings = Vec::new();
        for filter in &self.filters {
            let (condition, aggregate) = self.resolve_filter(filter)?;
            if aggregate {
                havings.push(condition);
            } else {
                filters.push(condition);
            }
        }
        for (key, value) in &self.automatic_filters {
            let (id, operator) = parse_filter_key(key);
            let dimension = self.shelf.find(id, &[IngredientKind::Dimension])?;
            filters.push(build_filter(&dimension, value, operator, self.shelf.now())?);
        }

        let dialect = self.shelf.builder().dialect();
        let ctx = RenderContext::new(dialect);
        let mut seen = HashSet::new();
        filters.retain(|f| seen.insert(f.render_conjunct(&ctx)));
        let mut seen = HashSet::new();
        havings.retain(|h| seen.insert(h.render_conjunct(&ctx)));

        let mut ingredients = dimensions;
        ingredients.extend(metrics);
        let order_by = self.brew_order_by(&ingredients);

        let query = BrewedQuery {
            dialect,
            from: self
                .select_from
                .clone()
                .unwrap_or_else(|| self.shelf.table().to_string()),
            columns,
            group_by,
            filters,
            havings,
            order_by,
            limit: self.limit,
            offset: self.offset,
            ingredients,
        };
        debug!(
            columns = query.columns.len(),
            filters = query.filters.len(),
            havings = query.havings.len(),
            "brewed recipe"
        );
        Ok(query)
    }

    fn brew_order_by(&self, used: &[Arc<Ingredient>]) -> Vec<OrderBy> {
        let mut order_by: Vec<OrderBy> = Vec::new();
        let mut push = |label: String, descending: bool| {
            if !order_by.iter().any(|o| o.label == label) {
                order_by.push(OrderBy { label, descending });
            }
        };

        for key in &self.order_by {
            let (id, forced_desc) = match key.strip_prefix('-') {
                Some(id) => (id, true),
                None => (key.as_str(), false),
            };
            match used.iter().find(|i| i.id == id) {
                Some(ingredient) => {
                    let descending = forced_desc || ingredient.ordering == SortDirection::Desc;
                    push(ingredient.sort_role().label(id), descending);
                }
                None => warn!(key = key.as_str(), "ignoring order_by key not used by the recipe"),
            }
        }
        for ingredient in used {
            if ingredient.role(Role::OrderBy).is_some() {
                push(
                    Role::OrderBy.label(&ingredient.id),
                    ingredient.ordering == SortDirection::Desc,
                );
            }
        }
        order_by
    }

    pub fn to_sql(&self) -> Result<String> {
        Ok(self.query()?.to_sql())
    }

    // -- Execution -----------------------------------------------------------

    fn dbinfo(&self) -> Result<&DbInfo> {
        self.dbinfo
            .as_deref()
            .ok_or_else(|| RecipeError::bad_recipe("No database has been set for this recipe"))
    }

    /// Run the recipe and enchant its rows.
    pub fn execute(&self) -> Result<RecipeResult> {
        let dbinfo = self.dbinfo()?;
        let query = self.query()?;
        let result = dbinfo.execute(&query.to_sql(), &[])?;
        let rows = Enchanter::new(&query.ingredients, self.anonymize)
            .enchant(result.columns, result.rows);
        Ok(RecipeResult {
            from_cache: result.from_cache,
            rows,
        })
    }

    pub fn all(&self) -> Result<Vec<RecipeRow>> {
        Ok(self.execute()?.rows)
    }

    /// The first row, if any.
    pub fn one(&self) -> Result<Option<RecipeRow>> {
        Ok(self.execute()?.rows.into_iter().next())
    }

    /// Alias for [`Recipe::one`].
    pub fn first(&self) -> Result<Option<RecipeRow>> {
        self.one()
    }

    pub fn dataset(&self) -> Result<Dataset> {
        Ok(Dataset::from_rows(&self.all()?))
    }

    /// Number of rows the recipe returns without limit and offset.
    pub fn total_count(&self) -> Result<i64> {
        let dbinfo = self.dbinfo()?;
        let sql = format!(
            "SELECT count(*) FROM (\n{}\n) AS subquery",
            self.query()?.to_unpaged_sql()
        );
        let result = dbinfo.execute(&sql, &[])?;
        match result.rows.first().and_then(|r| r.first()) {
            Some(Value::Integer(n)) => Ok(*n),
            other => Err(RecipeError::bad_recipe(format!(
                "unexpected count result: {other:?}"
            ))),
        }
    }
}
