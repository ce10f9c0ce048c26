//! Shelf and recipe error types.

use recipe_expression::ExpressionError;
use recipe_storage::StorageError;

/// Why a shelf entry could not be turned into an ingredient.
///
/// Kept on the shelf and raised only when a recipe uses the ingredient.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngredientError {
    /// The field (or a role or quickselect) failed to parse.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// `@name` names no shelf entry.
    #[error("@{0} doesn't exist on the shelf")]
    UnknownReference(String),

    /// `@` references loop back on themselves.
    #[error("Reference cycle: {}", .0.join(" -> "))]
    ReferenceCycle(Vec<String>),

    /// The entry parsed but can not be used as declared.
    #[error("{0}")]
    Invalid(String),
}

/// Errors that can occur while loading shelves or building recipes.
#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    /// The recipe asks for something the shelf can not give.
    #[error("{0}")]
    BadRecipe(String),

    /// A shelf ingredient used by the recipe is broken.
    #[error("{id}: {source}")]
    BadIngredient {
        /// The ingredient's shelf id.
        id: String,
        /// What is wrong with it.
        source: IngredientError,
    },

    /// A raw expression passed to the recipe is invalid.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// A structured filter could not be built.
    #[error("{0}")]
    BadFilter(String),

    /// A shelf file could not be parsed.
    #[error("failed to parse shelf: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Convenience alias used throughout the shelf crate.
pub type Result<T> = std::result::Result<T, RecipeError>;

impl RecipeError {
    // -- Constructors --------------------------------------------------------

    pub fn bad_recipe(message: impl Into<String>) -> Self {
        Self::BadRecipe(message.into())
    }

    pub fn bad_filter(message: impl Into<String>) -> Self {
        Self::BadFilter(message.into())
    }

    /// `<key> doesn't exist on the shelf`
    pub fn missing(key: &str) -> Self {
        Self::BadRecipe(format!("{key} doesn't exist on the shelf"))
    }

    // -- Predicates ----------------------------------------------------------

    pub fn is_bad_recipe(&self) -> bool {
        matches!(self, Self::BadRecipe(_))
    }
}
