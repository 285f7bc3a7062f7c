//! Request body templating
//!
//! A string node is a variable reference only when the whole string is
//! `{name}`. Partial references such as `"id-{name}"` are left alone, and so
//! is the literal `{}`.

use serde_json::Value;

use super::TemplateError;
use crate::value::VariableStore;

/// Name referenced by a string node, if it is exactly `{name}`
fn reference(s: &str) -> Option<&str> {
    if s.len() < 3 || !s.starts_with('{') || !s.ends_with('}') {
        return None;
    }
    Some(&s[1..s.len() - 1])
}

/// Replace every `{name}` string node in `tree` with the stored variable
///
/// Replacements keep the variable's native type, so an integer variable
/// becomes a JSON number rather than a string.
pub fn substitute(mut tree: Value, store: &VariableStore) -> Result<Value, TemplateError> {
    substitute_in_place(&mut tree, store)?;
    Ok(tree)
}

fn substitute_in_place(node: &mut Value, store: &VariableStore) -> Result<(), TemplateError> {
    let replacement = match node {
        Value::String(s) => match reference(s) {
            Some(name) => {
                let variable = store
                    .get(name)
                    .ok_or_else(|| TemplateError::MissingVariable(name.to_string()))?;
                Some(variable.to_value())
            }
            None => None,
        },
        Value::Object(map) => {
            for value in map.values_mut() {
                substitute_in_place(value, store)?;
            }
            None
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                substitute_in_place(item, store)?;
            }
            None
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => None,
    };

    if let Some(value) = replacement {
        *node = value;
    }
    Ok(())
}
