//! `@name` references between shelf entries.
//!
//! A reference is replaced by the referenced entry's field in parentheses,
//! recursively. References inside string literals are left alone.

use crate::error::IngredientError;
use crate::types::ShelfDefinition;

/// Expand every `@name` in `text`, which belongs to the entry `id`.
pub fn expand_references(
    id: &str,
    text: &str,
    definition: &ShelfDefinition,
) -> Result<String, IngredientError> {
    let mut stack = vec![id.to_string()];
    expand(text, definition, &mut stack)
}

/// Returns `true` if `text` contains a reference outside string literals.
pub fn has_references(text: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '@' => return true,
            None => {}
        }
    }
    false
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn expand(
    text: &str,
    definition: &ShelfDefinition,
    stack: &mut Vec<String>,
) -> Result<String, IngredientError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '"' || c == '\'' {
            out.push(c);
            i += 1;
            while i < chars.len() {
                let d = chars[i];
                out.push(d);
                i += 1;
                if d == '\\' && i < chars.len() {
                    out.push(chars[i]);
                    i += 1;
                } else if d == c {
                    break;
                }
            }
            continue;
        }

        if c == '@' {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && is_name_char(chars[end]) {
                end += 1;
            }
            if end > start {
                let name: String = chars[start..end].iter().collect();
                if let Some(pos) = stack.iter().position(|s| *s == name) {
                    let mut cycle = stack[pos..].to_vec();
                    cycle.push(name);
                    return Err(IngredientError::ReferenceCycle(cycle));
                }
                let entry = definition
                    .get(&name)
                    .ok_or_else(|| IngredientError::UnknownReference(name.clone()))?;

                stack.push(name);
                let inner = expand(entry.field(), definition, stack)?;
                stack.pop();

                out.push('(');
                out.push_str(&inner);
                out.push(')');
                i = end;
                continue;
            }
        }

        out.push(c);
        i += 1;
    }

    Ok(out)
}
