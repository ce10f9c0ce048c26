//! [`Shelf`] -- the ingredients a recipe can use, compiled for one table.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;
use recipe_expression::{Builder, BuilderResponse, ParseOptions};
use recipe_storage::DbInfo;
use tracing::{info, warn};

use crate::error::{IngredientError, RecipeError, Result};
use crate::ingredient::Ingredient;
use crate::parser::load_shelf_file;
use crate::references::{expand_references, has_references};
use crate::types::{IngredientKind, ShelfDefinition, ShelfEntry};

type Slot = std::result::Result<Arc<Ingredient>, IngredientError>;

/// A shelf of ingredients in declaration order.
///
/// Every entry is compiled when the shelf is built. Entries that fail keep
/// their error, which is raised only when a recipe asks for them.
pub struct Shelf {
    builder: Arc<Builder>,
    definition: ShelfDefinition,
    slots: Vec<Slot>,
}

impl std::fmt::Debug for Shelf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shelf")
            .field("table", &self.table())
            .field("ids", &self.definition.entries.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

impl Shelf {
    /// Compile `definition` against the builder's table.
    pub fn new(definition: ShelfDefinition, builder: Arc<Builder>) -> Self {
        let mut shelf = Self {
            builder,
            definition,
            slots: Vec::new(),
        };
        shelf.compile();
        shelf
    }

    /// Load a shelf file and compile it against `table` as reflected by
    /// `dbinfo`.
    pub fn load(path: &Path, dbinfo: &DbInfo, table: &str) -> Result<Self> {
        let definition = load_shelf_file(path)?;
        let schema = dbinfo.reflect(table)?;
        let builder = Arc::new(Builder::new(schema, dbinfo.dialect()));
        Ok(Self::new(definition, builder))
    }

    fn compile(&mut self) {
        self.slots = self
            .definition
            .entries
            .iter()
            .map(|(id, entry)| {
                Ingredient::build(id, entry.clone().into_spec(), &self.builder, &self.definition)
                    .map(Arc::new)
                    .inspect_err(|e| warn!(id = %id, error = %e, "invalid ingredient"))
            })
            .collect();
        info!(
            table = self.table(),
            ingredients = self.slots.len(),
            invalid = self.slots.iter().filter(|s| s.is_err()).count(),
            "compiled shelf"
        );
    }

    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    /// Name of the table the shelf is compiled against.
    pub fn table(&self) -> &str {
        &self.builder.schema().name
    }

    /// The clock relative dates are resolved against.
    pub fn now(&self) -> NaiveDateTime {
        self.builder.now()
    }

    pub fn definition(&self) -> &ShelfDefinition {
        &self.definition
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.definition.entries.iter().position(|(k, _)| k == id)
    }

    /// The compiled ingredient, or the error it failed with.
    pub fn get(&self, id: &str) -> Option<std::result::Result<&Arc<Ingredient>, &IngredientError>> {
        self.position(id).map(|i| self.slots[i].as_ref())
    }

    /// Entries in declaration order.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&str, std::result::Result<&Arc<Ingredient>, &IngredientError>)> {
        self.definition
            .entries
            .iter()
            .zip(&self.slots)
            .map(|((id, _), slot)| (id.as_str(), slot.as_ref()))
    }

    /// The kind of entry `id`: compiled, declared, or `None` if unknown.
    fn kind_of(&self, i: usize) -> Option<IngredientKind> {
        match &self.slots[i] {
            Ok(ingredient) => Some(ingredient.kind),
            Err(_) => match &self.definition.entries[i].1 {
                ShelfEntry::Spec(spec) => spec.kind,
                ShelfEntry::Field(_) => None,
            },
        }
    }

    /// Ids of the entries of `kind`, in declaration order.
    pub fn ids_of(&self, kind: IngredientKind) -> Vec<&str> {
        (0..self.len())
            .filter(|&i| self.kind_of(i) == Some(kind))
            .map(|i| self.definition.entries[i].0.as_str())
            .collect()
    }

    /// Look up `key`, which must be one of `kinds`.
    ///
    /// # Errors
    ///
    /// `<key> doesn't exist on the shelf`, `<key> is not a <kind>`, or the
    /// ingredient's own error when it failed to compile.
    pub fn find(&self, key: &str, kinds: &[IngredientKind]) -> Result<Arc<Ingredient>> {
        let i = self.position(key).ok_or_else(|| RecipeError::missing(key))?;
        if let Some(kind) = self.kind_of(i) {
            if !kinds.contains(&kind) {
                let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
                return Err(RecipeError::bad_recipe(format!(
                    "{key} is not a {}",
                    names.join(" or ")
                )));
            }
        }
        match &self.slots[i] {
            Ok(ingredient) => Ok(Arc::clone(ingredient)),
            Err(e) => Err(RecipeError::BadIngredient {
                id: key.to_string(),
                source: e.clone(),
            }),
        }
    }

    /// Add or replace an entry, then recompile the shelf so references to it
    /// resolve.
    pub fn insert(&mut self, id: impl Into<String>, entry: impl Into<ShelfEntry>) {
        let id = id.into();
        let entry = entry.into();
        match self.position(&id) {
            Some(i) => self.definition.entries[i].1 = entry,
            None => self.definition.entries.push((id, entry)),
        }
        self.compile();
    }

    /// Parse an expression that is not on the shelf, such as a raw recipe
    /// filter. `@name` references resolve against the shelf.
    pub fn parse_expression(
        &self,
        text: &str,
        options: &ParseOptions,
    ) -> Result<Arc<BuilderResponse>> {
        if !has_references(text) {
            return Ok(self.builder.parse(text, options)?);
        }
        let expanded = expand_references("", text, &self.definition).map_err(|e| match e {
            IngredientError::Expression(e) => RecipeError::Expression(e),
            other => RecipeError::bad_recipe(other.to_string()),
        })?;
        Ok(self.builder.parse(&expanded, options)?)
    }
}
