//! Core types for the recipe query builder.
//!
//! Holds the vocabulary shared by every other crate: generic column data
//! types, SQL dialects, table schemas, and the rows a recipe returns.

pub mod enums;
pub mod row;
pub mod schema;
pub mod value;

pub use enums::{DataType, Dialect, ParseEnumError};
pub use row::{Dataset, RecipeRow};
pub use schema::{Column, TableSchema, datatype_from_declared, is_valid_column};
pub use value::Value;
