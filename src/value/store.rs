//! Variable store
//!
//! Holds the values captured from setup responses for the lifetime of one
//! suite run. Each name is written once; templating reads it any number of
//! times.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use super::path::{resolve, PathError};
use super::type_name;

/// A captured value; only strings and integers can be captured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variable {
    String(String),
    Integer(i64),
}

impl Variable {
    /// Convert a response value into a variable, if its type is supported
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Variable::String(s.clone())),
            Value::Number(n) => n.as_i64().map(Variable::Integer),
            _ => None,
        }
    }

    /// The variable as a value tree node, keeping its native type
    pub fn to_value(&self) -> Value {
        match self {
            Variable::String(s) => Value::String(s.clone()),
            Variable::Integer(i) => Value::from(*i),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::String(s) => f.write_str(s),
            Variable::Integer(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for Variable {
    fn from(s: &str) -> Self {
        Variable::String(s.to_string())
    }
}

impl From<String> for Variable {
    fn from(s: String) -> Self {
        Variable::String(s)
    }
}

impl From<i64> for Variable {
    fn from(i: i64) -> Self {
        Variable::Integer(i)
    }
}

/// Failure to capture or store a variable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("variable {0} is already defined")]
    AlreadyDefined(String),

    #[error("variable {name}: {source}")]
    Path {
        name: String,
        #[source]
        source: PathError,
    },

    #[error("variable {name} is of type {found} in the response body, only string & integer is currently supported")]
    UnsupportedType { name: String, found: &'static str },
}

/// Name to value map shared by every step of a suite run
#[derive(Debug, Default, Clone)]
pub struct VariableStore {
    values: HashMap<String, Variable>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Store a variable; a name can only be written once per run
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Variable>) -> Result<(), StoreError> {
        let name = name.into();
        if self.values.contains_key(&name) {
            return Err(StoreError::AlreadyDefined(name));
        }
        self.values.insert(name, value.into());
        Ok(())
    }

    /// Capture `variable -> path` pairs from a decoded response body
    ///
    /// All pairs are resolved and type-checked before any is stored, so a
    /// failed capture leaves the store untouched.
    pub fn capture(&mut self, captures: &BTreeMap<String, String>, body: &Value) -> Result<(), StoreError> {
        let mut resolved = Vec::with_capacity(captures.len());
        for (name, path) in captures {
            if self.values.contains_key(name) {
                return Err(StoreError::AlreadyDefined(name.clone()));
            }

            let value = resolve(body, path).map_err(|source| StoreError::Path {
                name: name.clone(),
                source,
            })?;

            let variable = Variable::from_value(value).ok_or_else(|| StoreError::UnsupportedType {
                name: name.clone(),
                found: type_name(value),
            })?;

            resolved.push((name.clone(), variable));
        }

        for (name, variable) in resolved {
            tracing::debug!(variable = %name, value = %variable, "Captured response variable");
            self.values.insert(name, variable);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn captures(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_capture_string_and_integer() {
        let mut store = VariableStore::new();
        let body = json!({"data": {"uid": "u-1", "seq": 12, "items": [{"id": "i-0"}]}});
        store
            .capture(
                &captures(&[("uid", "data.uid"), ("seq", "data.seq"), ("first", "data.items[0].id")]),
                &body,
            )
            .unwrap();

        assert_eq!(store.get("uid"), Some(&Variable::String("u-1".to_string())));
        assert_eq!(store.get("seq"), Some(&Variable::Integer(12)));
        assert_eq!(store.get("first"), Some(&Variable::from("i-0")));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_capture_rejects_unsupported_types() {
        let mut store = VariableStore::new();
        let body = json!({"a": 1.5, "b": {"c": 1}, "d": true});
        for (name, path, found) in [("a", "a", "float"), ("b", "b", "object"), ("d", "d", "bool")] {
            let err = store.capture(&captures(&[(name, path)]), &body).unwrap_err();
            assert_eq!(
                err,
                StoreError::UnsupportedType {
                    name: name.to_string(),
                    found
                }
            );
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_capture_stores_nothing() {
        let mut store = VariableStore::new();
        let body = json!({"ok": "yes"});
        let err = store
            .capture(&captures(&[("ok", "ok"), ("zz", "missing.field")]), &body)
            .unwrap_err();
        assert!(matches!(err, StoreError::Path { ref name, .. } if name == "zz"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_names_are_write_once() {
        let mut store = VariableStore::new();
        store.insert("id", 1i64).unwrap();
        assert_eq!(
            store.insert("id", 2i64).unwrap_err(),
            StoreError::AlreadyDefined("id".to_string())
        );
        let err = store
            .capture(&captures(&[("id", "id")]), &json!({"id": 3}))
            .unwrap_err();
        assert_eq!(err, StoreError::AlreadyDefined("id".to_string()));
        assert_eq!(store.get("id"), Some(&Variable::Integer(1)));
    }

    #[test]
    fn test_display_and_native_value() {
        assert_eq!(Variable::Integer(42).to_string(), "42");
        assert_eq!(Variable::from("abc").to_string(), "abc");
        assert_eq!(Variable::Integer(42).to_value(), json!(42));
        assert_eq!(Variable::from("abc").to_value(), json!("abc"));
    }
}
