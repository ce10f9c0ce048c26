//! Expression errors with caret-annotated messages.

use std::fmt::Write;

/// A single problem found in an expression.
///
/// `pos` is a character offset into the expression text. Some problems
/// (division by zero, unparseable dates) are not tied to a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub pos: Option<usize>,
}

impl Diagnostic {
    pub fn at(message: impl Into<String>, pos: usize) -> Self {
        Self {
            message: message.into(),
            pos: Some(pos),
        }
    }

    pub fn unplaced(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            pos: None,
        }
    }
}

/// Errors produced while parsing or validating an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    /// The text could not be tokenized or parsed.
    #[error("{}", render_diagnostics(.text, std::slice::from_ref(.diagnostic)))]
    Syntax { text: String, diagnostic: Diagnostic },

    /// The expression parsed but failed validation. All problems are kept.
    #[error("{}", render_diagnostics(.text, .errors))]
    Invalid {
        text: String,
        errors: Vec<Diagnostic>,
    },

    /// The expression folded down to a literal, which can not be labeled.
    #[error("Must return an expression, not a constant value")]
    ConstantValue,
}

impl ExpressionError {
    /// All diagnostics carried by this error.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::Syntax { diagnostic, .. } => vec![diagnostic.clone()],
            Self::Invalid { errors, .. } => errors.clone(),
            Self::ConstantValue => vec![Diagnostic::unplaced(self.to_string())],
        }
    }
}

pub type Result<T> = std::result::Result<T, ExpressionError>;

/// Render diagnostics as
///
/// ```text
/// message
///
/// source text
///    ^
/// ```
///
/// one block after another. Unplaced diagnostics are just the message.
pub fn render_diagnostics(text: &str, diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for d in diagnostics {
        match d.pos {
            Some(pos) => {
                let _ = write!(out, "{}\n\n{}\n{}^\n", d.message, text, " ".repeat(pos));
            }
            None => {
                let _ = writeln!(out, "{}", d.message);
            }
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_caret_under_position() {
        let err = ExpressionError::Invalid {
            text: "[scores] + -1.0".into(),
            errors: vec![
                Diagnostic::at("scores is not a valid column name", 1),
                Diagnostic::at("unknown_col and num can not be added together", 1),
            ],
        };
        assert_eq!(
            err.to_string(),
            "scores is not a valid column name\n\n[scores] + -1.0\n ^\n\
             unknown_col and num can not be added together\n\n[scores] + -1.0\n ^"
        );
    }

    #[test]
    fn unplaced_is_message_only() {
        let err = ExpressionError::Invalid {
            text: "[score] / 0".into(),
            errors: vec![Diagnostic::unplaced(
                "When dividing, the denominator can not be zero",
            )],
        };
        assert_eq!(
            err.to_string(),
            "When dividing, the denominator can not be zero"
        );
    }
}
