//! Enum types shared across the recipe crates.
//!
//! Each enum has:
//! - Serialize/Deserialize as its lowercase string
//! - `as_str()`, `Display` and `FromStr` impls

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// The enum being parsed (e.g. "datatype").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

// ---------------------------------------------------------------------------
// Macro: defines a closed enum with string variants.
// ---------------------------------------------------------------------------
macro_rules! define_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident,
        variants: [
            $( ($variant:ident, $str:expr) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [$name] = &[ $( Self::$variant, )+ ];

            /// Returns the string representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $str, )+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

define_enum! {
    /// Generic data type of a column or expression.
    ///
    /// Database-specific types are collapsed into these when a table is
    /// reflected, see [`crate::schema::datatype_from_declared`].
    DataType, default = Str,
    variants: [
        (Bool, "bool"),
        (Date, "date"),
        (DateTime, "datetime"),
        (Num, "num"),
        (Str, "str"),
        (Unusable, "unusable"),
    ]
}

impl DataType {
    /// Name used in arithmetic error messages (`str` is spelled out).
    pub fn long_name(&self) -> &'static str {
        match self {
            Self::Str => "string",
            other => other.as_str(),
        }
    }

    /// Returns `true` for `date` and `datetime`.
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime)
    }

    /// Returns `true` if expressions may be built on columns of this type.
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Unusable)
    }
}

impl FromStr for DataType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(Self::Bool),
            "date" => Ok(Self::Date),
            "datetime" | "timestamp" => Ok(Self::DateTime),
            "num" | "number" | "numeric" => Ok(Self::Num),
            "str" | "string" => Ok(Self::Str),
            "unusable" => Ok(Self::Unusable),
            _ => Err(ParseEnumError {
                kind: "datatype",
                value: s.to_string(),
            }),
        }
    }
}

define_enum! {
    /// SQL dialect an expression is rendered for.
    Dialect, default = Sqlite,
    variants: [
        (Sqlite, "sqlite"),
        (Postgresql, "postgresql"),
        (Bigquery, "bigquery"),
    ]
}

impl Dialect {
    /// Returns `true` for postgres-compatible engines (including redshift).
    pub fn is_postgres(&self) -> bool {
        matches!(self, Self::Postgresql)
    }

    /// Quote `name` as an identifier, so keywords and mixed case survive.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Self::Bigquery => format!("`{}`", name.replace('`', "\\`")),
            Self::Sqlite | Self::Postgresql => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }
}

impl FromStr for Dialect {
    type Err = ParseEnumError;

    /// Accepts driver names as well, so `postgresql+psycopg2` and `redshift`
    /// both resolve to [`Dialect::Postgresql`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let driver = lower.split('+').next().unwrap_or_default();
        match driver {
            "sqlite" => Ok(Self::Sqlite),
            "bigquery" => Ok(Self::Bigquery),
            d if ["redshift", "postg", "pg"].iter().any(|id| d.contains(id)) => {
                Ok(Self::Postgresql)
            }
            _ => Err(ParseEnumError {
                kind: "dialect",
                value: s.to_string(),
            }),
        }
    }
}
