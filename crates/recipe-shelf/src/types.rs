//! Shelf data model: what a shelf file declares for each ingredient.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// The role an ingredient plays in a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngredientKind {
    Dimension,
    Metric,
    Filter,
    Having,
}

impl IngredientKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dimension => "dimension",
            Self::Metric => "metric",
            Self::Filter => "filter",
            Self::Having => "having",
        }
    }

    /// Dimensions and metrics become columns; filters and havings do not.
    pub fn is_selectable(self) -> bool {
        matches!(self, Self::Dimension | Self::Metric)
    }
}

impl fmt::Display for IngredientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default sort direction of an ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// A named condition offered as a shortcut on a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickSelect {
    pub name: String,
    /// Boolean expression, e.g. `[state] IN ("Vermont", "Maine")`.
    pub condition: String,
}

/// The full form of a shelf entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IngredientSpec {
    /// Inferred from the expression when omitted.
    #[serde(default)]
    pub kind: Option<IngredientKind>,

    /// The field expression.
    pub field: String,

    /// Expression for the `id` role of a dimension.
    #[serde(default)]
    pub id_field: Option<String>,

    /// Expression for the `order_by` role of a dimension.
    #[serde(default)]
    pub order_by_field: Option<String>,

    /// Direction used when a recipe sorts by this ingredient without a
    /// `-` prefix.
    #[serde(default)]
    pub ordering: SortDirection,

    /// Display format for enchanted rows, e.g. `comma` or `.2f`.
    #[serde(default)]
    pub format: Option<String>,

    #[serde(default)]
    pub quickselects: Vec<QuickSelect>,

    /// Replace values with a digest when the recipe anonymizes.
    #[serde(default)]
    pub anonymize: bool,

    #[serde(default)]
    pub singular: Option<String>,

    #[serde(default)]
    pub plural: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// A shelf entry: either a bare field expression or a full spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShelfEntry {
    Field(String),
    Spec(IngredientSpec),
}

impl ShelfEntry {
    /// Normalize into the full form.
    pub fn into_spec(self) -> IngredientSpec {
        match self {
            Self::Field(field) => IngredientSpec {
                field,
                ..IngredientSpec::default()
            },
            Self::Spec(spec) => spec,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Field(field) => field,
            Self::Spec(spec) => &spec.field,
        }
    }
}

impl From<&str> for ShelfEntry {
    fn from(field: &str) -> Self {
        Self::Field(field.to_string())
    }
}

impl From<IngredientSpec> for ShelfEntry {
    fn from(spec: IngredientSpec) -> Self {
        Self::Spec(spec)
    }
}

/// The entries of a shelf file, in document order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ShelfDefinition {
    pub entries: Vec<(String, ShelfEntry)>,
}

impl ShelfDefinition {
    pub fn get(&self, id: &str) -> Option<&ShelfEntry> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for ShelfDefinition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = ShelfDefinition;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of ingredient names to fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, ShelfEntry)> = Vec::new();
                while let Some((id, entry)) = map.next_entry::<String, ShelfEntry>()? {
                    if entries.iter().any(|(k, _)| *k == id) {
                        return Err(de::Error::custom(format!("duplicate ingredient: {id}")));
                    }
                    entries.push((id, entry));
                }
                Ok(ShelfDefinition { entries })
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn entries_keep_document_order() {
        let yaml = "zeta: '[a]'\nalpha: '[b]'\nmid:\n  kind: metric\n  field: sum([c])\n";
        let def: ShelfDefinition = serde_yaml::from_str(yaml).unwrap();
        let ids: Vec<&str> = def.entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
        assert_eq!(
            def.get("mid").unwrap().clone().into_spec().kind,
            Some(IngredientKind::Metric)
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let json = r#"{"a": "[x]", "a": "[y]"}"#;
        let err = serde_json::from_str::<ShelfDefinition>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate ingredient: a"));
    }

    #[test]
    fn full_spec_defaults() {
        let yaml = "state:\n  field: '[state]'\n  quickselects:\n    - {name: vt, condition: '[state] = \"Vermont\"'}\n";
        let def: ShelfDefinition = serde_yaml::from_str(yaml).unwrap();
        let spec = def.get("state").unwrap().clone().into_spec();
        assert_eq!(spec.kind, None);
        assert!(!spec.anonymize);
        assert_eq!(spec.quickselects[0].name, "vt");
    }
}
