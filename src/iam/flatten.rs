//! Flattening of nested attribute objects
//!
//! Statements address request attributes by a single compound key such as
//! `federated:provider` or `account.region`. Flattening walks nested objects
//! and joins the lowercased key segments with a separator. Arrays, scalars
//! and nulls are leaves, so quantified operators can still iterate arrays.
//!
//! Two paths can flatten to the same compound key (`{"A": 1, "a": 2}`, or
//! `{"a:b": 1, "a": {"b": 2}}` with `:`). The walk is depth-first in the
//! source object's key order and the last write wins.

use crate::error::{AuthzError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Deepest object nesting accepted by [`flatten`]
pub const MAX_FLATTEN_DEPTH: usize = 32;

/// Flattened attribute map
pub type FlatMap = HashMap<String, Value>;

/// Flatten a nested object into compound keys joined by `separator`
///
/// A non-object root flattens to an empty map.
///
/// # Examples
/// ```
/// use lrn_authz::iam::flatten;
/// use serde_json::json;
///
/// let flat = flatten(&json!({"Federated": {"Id": "abc"}}), ":").unwrap();
/// assert_eq!(flat["federated:id"], json!("abc"));
/// ```
pub fn flatten(value: &Value, separator: &str) -> Result<FlatMap> {
    let mut out = FlatMap::new();
    flatten_into(value, separator, &mut out)?;
    Ok(out)
}

/// Flatten `value` into an existing map, overwriting colliding keys
pub fn flatten_into(value: &Value, separator: &str, out: &mut FlatMap) -> Result<()> {
    if let Value::Object(map) = value {
        walk(map, separator, "", 0, out)?;
    }
    Ok(())
}

fn walk(
    map: &Map<String, Value>,
    separator: &str,
    prefix: &str,
    depth: usize,
    out: &mut FlatMap,
) -> Result<()> {
    if depth >= MAX_FLATTEN_DEPTH {
        return Err(AuthzError::FlattenDepthExceeded(MAX_FLATTEN_DEPTH));
    }

    for (key, value) in map {
        let compound = format!("{}{}", prefix, key.to_lowercase());
        match value {
            Value::Object(nested) => {
                let nested_prefix = format!("{}{}", compound, separator);
                walk(nested, separator, &nested_prefix, depth + 1, out)?;
            }
            leaf => {
                out.insert(compound, leaf.clone());
            }
        }
    }

    Ok(())
}

/// Render a value the way statement patterns and templates see it
///
/// Strings are used verbatim, arrays are comma-joined element renderings
/// and objects render as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}
