//! Shelves of ingredients, and the recipes that query them.
//!
//! A shelf file maps ingredient ids to field expressions. [`Shelf`] compiles
//! them against one table; [`Recipe`] picks ingredients from a shelf and
//! renders or executes the resulting SQL.

pub mod enchant;
pub mod error;
pub mod filters;
pub mod format;
pub mod ingredient;
pub mod parser;
pub mod recipe;
pub mod references;
pub mod shelf;
pub mod types;

pub use enchant::{Enchanter, anonymize_value};
pub use error::{IngredientError, RecipeError, Result};
pub use filters::{ALLOWED_OPERATORS, build_filter, parse_filter_key};
pub use format::FormatSpec;
pub use ingredient::{Ingredient, Role};
pub use parser::{load_shelf_file, parse_json, parse_toml, parse_yaml};
pub use recipe::{BrewedQuery, OrderBy, Recipe, RecipeResult, SelectColumn};
pub use shelf::Shelf;
pub use types::{
    IngredientKind, IngredientSpec, QuickSelect, ShelfDefinition, ShelfEntry, SortDirection,
};
