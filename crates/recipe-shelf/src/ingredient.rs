//! Ingredients: shelf entries compiled against a table.

use std::sync::Arc;

use recipe_core::{DataType, is_valid_column};
use recipe_expression::{Builder, BuilderResponse, ParseOptions, SqlExpr};

use crate::error::IngredientError;
use crate::format::FormatSpec;
use crate::references::expand_references;
use crate::types::{IngredientKind, IngredientSpec, ShelfDefinition, SortDirection};

/// A column an ingredient contributes, labelled from the ingredient id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The field itself, labelled `id`.
    Value,
    /// The `id_field`, labelled `id__id`.
    Id,
    /// The `order_by_field`, labelled `id__order_by`.
    OrderBy,
}

impl Role {
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Self::Value => None,
            Self::Id => Some("id"),
            Self::OrderBy => Some("order_by"),
        }
    }

    /// The column label for this role of ingredient `id`.
    pub fn label(self, id: &str) -> String {
        match self.suffix() {
            Some(suffix) => format!("{id}__{suffix}"),
            None => id.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoleExpr {
    pub role: Role,
    pub response: Arc<BuilderResponse>,
}

#[derive(Debug, Clone)]
pub struct CompiledQuickSelect {
    pub name: String,
    pub condition: SqlExpr,
}

/// A validated, compiled shelf entry.
#[derive(Debug, Clone)]
pub struct Ingredient {
    pub id: String,
    pub kind: IngredientKind,
    /// The value role first, then `id` and `order_by` when declared.
    pub roles: Vec<RoleExpr>,
    pub ordering: SortDirection,
    pub format: Option<FormatSpec>,
    pub quickselects: Vec<CompiledQuickSelect>,
    pub anonymize: bool,
    pub singular: Option<String>,
    pub plural: Option<String>,
    pub description: Option<String>,
}

fn options_for(kind: IngredientKind) -> ParseOptions {
    match kind {
        IngredientKind::Metric => ParseOptions::enforce_aggregation(),
        IngredientKind::Dimension | IngredientKind::Filter => ParseOptions::forbid_aggregation(),
        IngredientKind::Having => ParseOptions::default(),
    }
}

fn invalid(message: impl Into<String>) -> IngredientError {
    IngredientError::Invalid(message.into())
}

impl Ingredient {
    /// Compile `spec` as the shelf entry `id`.
    ///
    /// `definition` resolves `@name` references in every expression of the
    /// entry. When the entry declares no kind, an aggregated field makes a metric
    /// and anything else a dimension.
    pub fn build(
        id: &str,
        spec: IngredientSpec,
        builder: &Builder,
        definition: &ShelfDefinition,
    ) -> Result<Self, IngredientError> {
        if !is_valid_column(id) {
            return Err(invalid(format!("{id} is not a valid ingredient name")));
        }

        let parse = |text: &str, options: &ParseOptions| -> Result<Arc<BuilderResponse>, IngredientError> {
            let expanded = expand_references(id, text, definition)?;
            Ok(builder.parse(&expanded, options)?)
        };

        let kind = match spec.kind {
            Some(kind) => kind,
            None if parse(&spec.field, &ParseOptions::default())?.is_aggregate => {
                IngredientKind::Metric
            }
            None => IngredientKind::Dimension,
        };

        let value = parse(&spec.field, &options_for(kind))?;
        match kind {
            IngredientKind::Filter | IngredientKind::Having if value.datatype != DataType::Bool => {
                return Err(invalid("This should be a boolean column or expression"));
            }
            IngredientKind::Metric | IngredientKind::Having if !value.is_aggregate => {
                return Err(invalid(format!("A {kind} must be aggregated")));
            }
            _ => {}
        }

        let mut roles = vec![RoleExpr {
            role: Role::Value,
            response: value,
        }];
        for (role, field) in [
            (Role::Id, &spec.id_field),
            (Role::OrderBy, &spec.order_by_field),
        ] {
            let Some(field) = field else { continue };
            if kind != IngredientKind::Dimension {
                return Err(invalid(format!(
                    "Only dimensions can have an {}_field",
                    role.suffix().unwrap_or_default()
                )));
            }
            roles.push(RoleExpr {
                role,
                response: parse(field, &ParseOptions::forbid_aggregation())?,
            });
        }

        let format = match spec.format.as_deref() {
            Some(f) => Some(FormatSpec::parse(f).ok_or_else(|| invalid(format!("Unknown format: {f}")))?),
            None => None,
        };

        let mut quickselects = Vec::with_capacity(spec.quickselects.len());
        for qs in spec.quickselects {
            let condition = parse(&qs.condition, &ParseOptions::forbid_aggregation())?;
            if condition.datatype != DataType::Bool {
                return Err(invalid(format!(
                    "Quickselect {} should be a boolean column or expression",
                    qs.name
                )));
            }
            quickselects.push(CompiledQuickSelect {
                name: qs.name,
                condition: condition.expression.clone(),
            });
        }

        Ok(Self {
            id: id.to_string(),
            kind,
            roles,
            ordering: spec.ordering,
            format,
            quickselects,
            anonymize: spec.anonymize,
            singular: spec.singular,
            plural: spec.plural,
            description: spec.description,
        })
    }

    /// The value role's compiled expression.
    pub fn value(&self) -> &BuilderResponse {
        &self.roles[0].response
    }

    pub fn datatype(&self) -> DataType {
        self.value().datatype
    }

    pub fn is_aggregate(&self) -> bool {
        self.value().is_aggregate
    }

    pub fn role(&self, role: Role) -> Option<&BuilderResponse> {
        self.roles
            .iter()
            .find(|r| r.role == role)
            .map(|r| r.response.as_ref())
    }

    /// Column labels in select order.
    pub fn labels(&self) -> impl Iterator<Item = String> + '_ {
        self.roles.iter().map(|r| r.role.label(&self.id))
    }

    /// The role a recipe sorts by: `order_by` when declared, else the value.
    pub fn sort_role(&self) -> Role {
        if self.role(Role::OrderBy).is_some() {
            Role::OrderBy
        } else {
            Role::Value
        }
    }

    pub fn quickselect(&self, name: &str) -> Option<&SqlExpr> {
        self.quickselects
            .iter()
            .find(|q| q.name == name)
            .map(|q| &q.condition)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use recipe_core::{Dialect, TableSchema};

    use super::*;
    use crate::parser::parse_yaml;

    fn builder() -> Builder {
        Builder::new(
            Arc::new(
                TableSchema::new("census")
                    .column("state", DataType::Str)
                    .column("sex", DataType::Str)
                    .column("age", DataType::Num)
                    .column("pop2000", DataType::Num)
                    .column("pop2008", DataType::Num),
            ),
            Dialect::Sqlite,
        )
    }

    fn build(id: &str, yaml: &str) -> Result<Ingredient, IngredientError> {
        let def = parse_yaml(yaml).unwrap();
        let spec = def.get(id).unwrap().clone().into_spec();
        Ingredient::build(id, spec, &builder(), &def)
    }

    #[test]
    fn kinds_are_inferred() {
        let state = build("state", "state: '[state]'").unwrap();
        assert_eq!(state.kind, IngredientKind::Dimension);
        assert_eq!(state.value().expression.to_string(), "census.state");

        let pop = build("pop", "pop: sum([pop2000])").unwrap();
        assert_eq!(pop.kind, IngredientKind::Metric);
    }

    #[test]
    fn metrics_enforce_aggregation() {
        let pop = build("pop", "pop: {kind: metric, field: '[pop2000]'}").unwrap();
        assert_eq!(pop.value().expression.to_string(), "sum(census.pop2000)");

        let err = build("st", "st: {kind: metric, field: '[state]'}").unwrap_err();
        assert_eq!(err.to_string(), "A metric must be aggregated");
    }

    #[test]
    fn dimensions_forbid_aggregation() {
        let err = build("pop", "pop: {kind: dimension, field: 'sum([pop2000])'}").unwrap_err();
        assert!(matches!(err, IngredientError::Expression(_)));
        assert!(err.to_string().starts_with("Aggregations are not allowed in this field."));
    }

    #[test]
    fn roles_and_labels() {
        let yaml = "
state:
  field: '[state]'
  id_field: '[sex]'
  order_by_field: '[age]'
";
        let state = build("state", yaml).unwrap();
        let labels: Vec<String> = state.labels().collect();
        assert_eq!(labels, vec!["state", "state__id", "state__order_by"]);
        assert_eq!(state.sort_role(), Role::OrderBy);
        assert_eq!(
            state.role(Role::Id).unwrap().expression.to_string(),
            "census.sex"
        );
    }

    #[test]
    fn filters_must_be_boolean() {
        let f = build("old", "old: {kind: filter, field: '[age] > 40'}").unwrap();
        assert_eq!(f.value().expression.to_string(), "census.age > 40");

        let err = build("bad", "bad: {kind: filter, field: '[age]'}").unwrap_err();
        assert_eq!(err.to_string(), "This should be a boolean column or expression");
    }

    #[test]
    fn quickselects_compile() {
        let yaml = r#"
state:
  field: '[state]'
  quickselects:
    - {name: vt, condition: '[state] = "Vermont"'}
"#;
        let state = build("state", yaml).unwrap();
        assert_eq!(
            state.quickselect("vt").unwrap().to_string(),
            "census.state = 'Vermont'"
        );
        assert!(state.quickselect("nh").is_none());
    }

    #[test]
    fn bad_entries() {
        assert_eq!(
            build("pop", "pop: {field: 'sum([pop2000])', format: fancy}")
                .unwrap_err()
                .to_string(),
            "Unknown format: fancy"
        );
        assert_eq!(
            build("pop", "pop: {field: 'sum([pop2000])', id_field: '[state]'}")
                .unwrap_err()
                .to_string(),
            "Only dimensions can have an id_field"
        );
        assert_eq!(
            build("my pop", "my pop: sum([pop2000])").unwrap_err().to_string(),
            "my pop is not a valid ingredient name"
        );
    }
}
