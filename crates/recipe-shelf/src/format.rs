//! Display formats for enchanted values.
//!
//! Formats use a small subset of the Python format mini-language:
//! an optional `$`, an optional `,` for thousands separators, an optional
//! `.N` precision, and a type of `f` (fixed) or `%` (percent). The names
//! `comma`, `dollar` and `percent` are shorthands.

use recipe_core::Value;

/// A parsed display format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub currency: bool,
    pub grouping: bool,
    pub precision: usize,
    pub percent: bool,
}

impl FormatSpec {
    /// Parse a format name or pattern. Returns `None` for unknown formats.
    pub fn parse(format: &str) -> Option<Self> {
        let named = match format {
            "comma" => Some(",.0f"),
            "dollar" | "$" => Some("$,.2f"),
            "percent" => Some(".0%"),
            _ => None,
        };
        let mut rest = named.unwrap_or(format);

        let currency = rest.starts_with('$');
        if currency {
            rest = &rest[1..];
        }
        let grouping = rest.starts_with(',');
        if grouping {
            rest = &rest[1..];
        }

        let mut precision = None;
        if let Some(after_dot) = rest.strip_prefix('.') {
            let digits: String = after_dot.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                return None;
            }
            precision = digits.parse().ok();
            rest = &after_dot[digits.len()..];
        }

        let percent = match rest {
            "%" => true,
            "f" | "" => false,
            _ => return None,
        };
        if !currency && !grouping && precision.is_none() && !percent && rest.is_empty() {
            return None;
        }

        Some(Self {
            currency,
            grouping,
            precision: precision.unwrap_or(if percent { 0 } else { 2 }),
            percent,
        })
    }

    /// Format a numeric value. Non-numeric values are shown as they are.
    pub fn apply(&self, value: &Value) -> Value {
        let n = match value {
            Value::Null => return Value::Null,
            Value::Integer(n) => *n as f64,
            Value::Real(f) => *f,
            Value::Text(s) => return Value::Text(s.clone()),
        };
        let n = if self.percent { n * 100.0 } else { n };

        let fixed = format!("{:.*}", self.precision, n.abs());
        let (int_part, frac_part) = match fixed.split_once('.') {
            Some((i, f)) => (i.to_string(), Some(f.to_string())),
            None => (fixed, None),
        };

        let mut out = String::new();
        let is_zero = fixed_is_zero(&int_part, frac_part.as_deref());
        if n < 0.0 && !is_zero {
            out.push('-');
        }
        if self.currency {
            out.push('$');
        }
        if self.grouping {
            out.push_str(&group_thousands(&int_part));
        } else {
            out.push_str(&int_part);
        }
        if let Some(frac) = frac_part {
            out.push('.');
            out.push_str(&frac);
        }
        if self.percent {
            out.push('%');
        }
        Value::Text(out)
    }
}

fn fixed_is_zero(int_part: &str, frac_part: Option<&str>) -> bool {
    int_part.chars().all(|c| c == '0') && frac_part.is_none_or(|f| f.chars().all(|c| c == '0'))
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
