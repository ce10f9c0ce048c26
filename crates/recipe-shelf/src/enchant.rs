//! Row post-processing: formatted columns and anonymized values.

use std::sync::Arc;

use recipe_core::{RecipeRow, Value};
use sha2::{Digest, Sha256};

use crate::ingredient::Ingredient;

/// Hex digits kept from an anonymized value's digest.
const ANONYMIZED_LEN: usize = 8;

/// Replace a value with a short digest of its text. Nulls stay null.
pub fn anonymize_value(value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let mut h = Sha256::new();
    h.update(value.to_string().as_bytes());
    let digest = format!("{:x}", h.finalize());
    Value::Text(digest[..ANONYMIZED_LEN].to_string())
}

/// Turns raw result rows into [`RecipeRow`]s.
///
/// Every ingredient with a format adds a `<id>__formatted` column after the
/// selected columns. With `anonymize` on, values of ingredients flagged
/// `anonymize` are replaced by [`anonymize_value`] before formatting.
pub struct Enchanter<'a> {
    ingredients: &'a [Arc<Ingredient>],
    anonymize: bool,
}

impl<'a> Enchanter<'a> {
    pub fn new(ingredients: &'a [Arc<Ingredient>], anonymize: bool) -> Self {
        Self {
            ingredients,
            anonymize,
        }
    }

    fn formatted(&self) -> impl Iterator<Item = &Arc<Ingredient>> {
        self.ingredients.iter().filter(|i| i.format.is_some())
    }

    pub fn enchant(&self, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Vec<RecipeRow> {
        let base = Arc::new(columns);
        let mut all = (*base).clone();
        all.extend(self.formatted().map(|i| format!("{}__formatted", i.id)));
        let all = Arc::new(all);

        rows.into_iter()
            .map(|values| {
                let mut row = RecipeRow::new(Arc::clone(&base), values);
                if self.anonymize {
                    for ingredient in self.ingredients.iter().filter(|i| i.anonymize) {
                        if let Some(v) = row.get(&ingredient.id).map(anonymize_value) {
                            row.set(&ingredient.id, v);
                        }
                    }
                }
                let extra: Vec<Value> = self
                    .formatted()
                    .map(|i| match (&i.format, row.get(&i.id)) {
                        (Some(format), Some(v)) => format.apply(v),
                        _ => Value::Null,
                    })
                    .collect();
                if extra.is_empty() {
                    row
                } else {
                    row.extend(Arc::clone(&all), extra)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use recipe_core::{DataType, Dialect, TableSchema};
    use recipe_expression::Builder;

    use super::*;
    use crate::parser::parse_yaml;
    use crate::types::ShelfDefinition;

    fn ingredients(yaml: &str) -> Vec<Arc<Ingredient>> {
        let builder = Builder::new(
            Arc::new(
                TableSchema::new("census")
                    .column("state", DataType::Str)
                    .column("pop2000", DataType::Num),
            ),
            Dialect::Sqlite,
        );
        let def: ShelfDefinition = parse_yaml(yaml).unwrap();
        def.entries
            .iter()
            .map(|(id, e)| {
                Arc::new(Ingredient::build(id, e.clone().into_spec(), &builder, &def).unwrap())
            })
            .collect()
    }

    #[test]
    fn adds_formatted_columns() {
        let ingredients = ingredients(
            r#"
state: '[state]'
pop: {field: 'sum([pop2000])', format: comma}
"#,
        );
        let rows = Enchanter::new(&ingredients, false).enchant(
            vec!["state".into(), "pop".into()],
            vec![vec!["Vermont".into(), Value::Integer(1_234_567)], vec![Value::Null, Value::Null]],
        );
        assert_eq!(rows[0].fields(), &["state", "pop", "pop__formatted"]);
        assert_eq!(rows[0].get("pop__formatted"), Some(&Value::from("1,234,567")));
        assert_eq!(rows[1].get("pop__formatted"), Some(&Value::Null));
    }

    #[test]
    fn no_formats_keeps_columns() {
        let ingredients = ingredients("state: '[state]'");
        let rows = Enchanter::new(&ingredients, false)
            .enchant(vec!["state".into()], vec![vec!["Vermont".into()]]);
        assert_eq!(rows[0].fields(), &["state"]);
    }

    #[test]
    fn anonymizes_only_when_enabled() {
        let ingredients = ingredients("state: {field: '[state]', anonymize: true}");
        let columns = vec!["state".to_string()];
        let rows = vec![vec![Value::from("Vermont")]];

        let plain = Enchanter::new(&ingredients, false).enchant(columns.clone(), rows.clone());
        assert_eq!(plain[0].get("state"), Some(&Value::from("Vermont")));

        let hidden = Enchanter::new(&ingredients, true).enchant(columns, rows);
        let v = hidden[0].get("state").unwrap();
        assert_eq!(v, &anonymize_value(&Value::from("Vermont")));
        assert_eq!(v.as_str().map(str::len), Some(ANONYMIZED_LEN));
        assert_ne!(v, &Value::from("Vermont"));
    }

    #[test]
    fn anonymize_is_stable() {
        assert_eq!(anonymize_value(&"a".into()), anonymize_value(&"a".into()));
        assert_ne!(anonymize_value(&"a".into()), anonymize_value(&"b".into()));
        assert_eq!(anonymize_value(&Value::Null), Value::Null);
    }
}
