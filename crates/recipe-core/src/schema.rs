//! Table schemas that expressions are built against.

use serde::{Deserialize, Serialize};

use crate::enums::DataType;

/// A single column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Self {
            name: name.into(),
            datatype,
        }
    }
}

/// A named table and its columns, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Builder-style helper used when declaring schemas in code.
    pub fn column(mut self, name: impl Into<String>, datatype: DataType) -> Self {
        self.columns.push(Column::new(name, datatype));
        self
    }

    /// Look up a column case-insensitively.
    ///
    /// Columns whose names are not valid identifiers are never returned, so
    /// an expression can not reference them.
    pub fn find(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .filter(|c| is_valid_column(&c.name))
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Columns of the given datatype, in declaration order.
    pub fn columns_of(&self, datatype: DataType) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(move |c| c.datatype == datatype && is_valid_column(&c.name))
    }
}

/// Returns `true` if `name` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_valid_column(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Collapse a declared SQL column type into a generic [`DataType`].
///
/// Matching is by substring in the same spirit as SQLite's type affinity
/// rules; `DATETIME` must be checked before `DATE`.
pub fn datatype_from_declared(declared: &str) -> DataType {
    let decl = declared.to_ascii_lowercase();
    if decl.contains("datetime") || decl.contains("timestamp") {
        DataType::DateTime
    } else if decl.contains("date") {
        DataType::Date
    } else if decl.contains("bool") {
        DataType::Bool
    } else if ["int", "real", "floa", "doub", "numeric", "decimal"]
        .iter()
        .any(|t| decl.contains(t))
    {
        DataType::Num
    } else if ["char", "text", "clob", "string"]
        .iter()
        .any(|t| decl.contains(t))
    {
        DataType::Str
    } else {
        DataType::Unusable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn valid_columns() {
        for v in [
            "this",
            "that",
            "THIS",
            "THAT",
            "this_that_and_other",
            "_other",
            "THIS_that_",
        ] {
            assert!(is_valid_column(v), "{v} should be valid");
        }
    }

    #[test]
    fn invalid_columns() {
        for v in [
            " this",
            "that ",
            " THIS",
            "TH AT  ",
            "for_slackbot}_organization_name",
            "",
            "9lives",
        ] {
            assert!(!is_valid_column(v), "{v:?} should be invalid");
        }
    }

    #[test]
    fn declared_types() {
        assert_eq!(datatype_from_declared("VARCHAR(20)"), DataType::Str);
        assert_eq!(datatype_from_declared("INTEGER"), DataType::Num);
        assert_eq!(datatype_from_declared("FLOAT"), DataType::Num);
        assert_eq!(datatype_from_declared("DATE"), DataType::Date);
        assert_eq!(datatype_from_declared("DATETIME"), DataType::DateTime);
        assert_eq!(datatype_from_declared("TIMESTAMP"), DataType::DateTime);
        assert_eq!(datatype_from_declared("BOOLEAN"), DataType::Bool);
        assert_eq!(datatype_from_declared("JSON"), DataType::Unusable);
        assert_eq!(datatype_from_declared(""), DataType::Unusable);
    }

    #[test]
    fn find_is_case_insensitive() {
        let t = TableSchema::new("scores")
            .column("Score", DataType::Num)
            .column("bad name", DataType::Str);
        assert_eq!(t.find("SCORE").map(|c| c.name.as_str()), Some("Score"));
        assert!(t.find("bad name").is_none());
        assert_eq!(t.columns_of(DataType::Str).count(), 0);
    }
}
