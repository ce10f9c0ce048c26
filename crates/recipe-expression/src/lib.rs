//! Field expression language for recipe.
//!
//! A field expression such as `sum([score]) / count(*)` is parsed against a
//! [`TableSchema`](recipe_core::TableSchema), type checked, constant folded
//! and compiled into a [`SqlExpr`] tree that renders for a [`Dialect`].
//!
//! ```ignore
//! let builder = Builder::new(schema, Dialect::Sqlite);
//! let resp = builder.parse("[score] / 2", &ParseOptions::default())?;
//! assert_eq!(resp.expression.to_string(), "CAST(datatypes.score AS FLOAT) / 2");
//! ```
//!
//! Pipeline: [`lexer`] -> [`parser`] (an [`ast::Expr`] with source
//! positions) -> [`compile`] (validation and folding) -> [`sql`].

pub mod ast;
pub mod builder;
pub mod compile;
pub mod error;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod sql;

pub use builder::{Builder, BuilderResponse, ParseOptions};
pub use error::{Diagnostic, ExpressionError, Result};
pub use recipe_core::Dialect;
pub use sql::{Literal, RenderContext, SqlExpr};
