//! Value trees and the variables captured from them
//!
//! Request, response and callback bodies are all `serde_json::Value`
//! trees, with object key order preserved. This module reads and writes
//! locations inside those trees by dotted path and keeps the variables a
//! suite captures along the way.

pub mod path;
pub mod store;

pub use path::{resolve, write, PathError};
pub use serde_json::Value;
pub use store::{StoreError, Variable, VariableStore};

/// JSON type name of a value, as used in error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
