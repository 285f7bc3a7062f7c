//! Dotted path resolution
//!
//! A path is a `.`-separated list of segments. A segment is either a field
//! name (`data`) or a field followed by an array index (`tunnels[0]`).
//! Every error names the dotted prefix at which resolution failed, so
//! `data.items[3].id` on a two-element array reports `data.items[3]`.

use serde_json::Value;
use thiserror::Error;

use super::type_name;

/// Failure to resolve or write a path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    EmptyPath,

    #[error("field {path}: not found")]
    NotFound { path: String },

    #[error("field {}: required type is object but got {found}", display_prefix(.path))]
    NotAnObject { path: String, found: &'static str },

    #[error("field {path}: required type is array but got {found}")]
    NotAnArray { path: String, found: &'static str },

    #[error("field {path}: invalid index notation '{index}'")]
    InvalidIndex { path: String, index: String },

    #[error("field {path}: index out of range with length {len}")]
    IndexOutOfRange { path: String, len: usize },

    #[error("field {path}: writing into array elements is not supported")]
    ArrayWriteUnsupported { path: String },
}

fn display_prefix(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Field(&'a str),
    Index { name: &'a str, index: usize },
}

impl<'a> Segment<'a> {
    /// Parse one segment; `prefix` is the dotted path up to and including it
    fn parse(raw: &'a str, prefix: &str) -> Result<Self, PathError> {
        let open = match raw.find('[') {
            Some(open) if raw.ends_with(']') => open,
            _ => return Ok(Segment::Field(raw)),
        };

        let index = &raw[open + 1..raw.len() - 1];
        let index = index.parse::<usize>().map_err(|_| PathError::InvalidIndex {
            path: prefix.to_string(),
            index: index.to_string(),
        })?;

        Ok(Segment::Index {
            name: &raw[..open],
            index,
        })
    }
}

/// Split a path into its raw segments
fn split(path: &str) -> Result<Vec<&str>, PathError> {
    if path.is_empty() {
        return Err(PathError::EmptyPath);
    }
    Ok(path.split('.').collect())
}

fn prefix(parts: &[&str], upto: usize) -> String {
    parts[..=upto].join(".")
}

/// Descend one segment from `current`, which must be an object
fn descend<'v>(
    current: &'v Value,
    parts: &[&str],
    at: usize,
) -> Result<&'v Value, PathError> {
    let here = prefix(parts, at);
    let object = current.as_object().ok_or_else(|| PathError::NotAnObject {
        path: if at == 0 { String::new() } else { prefix(parts, at - 1) },
        found: type_name(current),
    })?;

    match Segment::parse(parts[at], &here)? {
        Segment::Field(name) => object
            .get(name)
            .ok_or(PathError::NotFound { path: here }),
        Segment::Index { name, index } => {
            let field = object
                .get(name)
                .ok_or_else(|| PathError::NotFound { path: here.clone() })?;
            let items = field.as_array().ok_or_else(|| PathError::NotAnArray {
                path: here.clone(),
                found: type_name(field),
            })?;
            items.get(index).ok_or(PathError::IndexOutOfRange {
                path: here,
                len: items.len(),
            })
        }
    }
}

fn descend_mut<'v>(
    current: &'v mut Value,
    parts: &[&str],
    at: usize,
) -> Result<&'v mut Value, PathError> {
    let here = prefix(parts, at);
    let found = type_name(current);
    let object = current.as_object_mut().ok_or_else(|| PathError::NotAnObject {
        path: if at == 0 { String::new() } else { prefix(parts, at - 1) },
        found,
    })?;

    match Segment::parse(parts[at], &here)? {
        Segment::Field(name) => object
            .get_mut(name)
            .ok_or(PathError::NotFound { path: here }),
        Segment::Index { name, index } => {
            let field = object
                .get_mut(name)
                .ok_or_else(|| PathError::NotFound { path: here.clone() })?;
            let found = type_name(field);
            let items = field.as_array_mut().ok_or_else(|| PathError::NotAnArray {
                path: here.clone(),
                found,
            })?;
            let len = items.len();
            items
                .get_mut(index)
                .ok_or(PathError::IndexOutOfRange { path: here, len })
        }
    }
}

/// Resolve `path` inside `tree`
///
/// The terminal value is returned as stored, whatever its type. A `null`
/// stored at the path is a successful resolution; a missing key never is.
pub fn resolve<'v>(tree: &'v Value, path: &str) -> Result<&'v Value, PathError> {
    let parts = split(path)?;
    let mut current = tree;
    for at in 0..parts.len() {
        current = descend(current, &parts, at)?;
    }
    Ok(current)
}

/// Write `value` at `path` inside `tree`
///
/// Every segment but the last must already exist and lead to an object; the
/// last segment names the field to insert or overwrite. Writing to an array
/// element (`items[0]` as the last segment) is rejected.
pub fn write(tree: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    let parts = split(path)?;
    let last = parts.len() - 1;

    let mut current = tree;
    for at in 0..last {
        current = descend_mut(current, &parts, at)?;
    }

    let here = prefix(&parts, last);
    let name = match Segment::parse(parts[last], &here)? {
        Segment::Field(name) => name,
        Segment::Index { .. } => return Err(PathError::ArrayWriteUnsupported { path: here }),
    };

    let found = type_name(current);
    let object = current.as_object_mut().ok_or_else(|| PathError::NotAnObject {
        path: if last == 0 { String::new() } else { prefix(&parts, last - 1) },
        found,
    })?;
    object.insert(name.to_string(), value);
    Ok(())
}
