//! Skeleton denormalization.
//!
//! The inverse of extraction: every `{"__ref": key}` placeholder in a
//! skeleton is substituted by the entity it names, looked up overlay-first
//! so optimistic values shadow the base store. Entities may reference each
//! other cyclically; a per-path visited set stops the recursion by leaving
//! the repeated reference in place.

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::normalize::as_reference;
use crate::store::EntityTable;

/// Resolve every reference in `skeleton` against `overlay`, then `base`.
///
/// References whose key is absent from both tables pass through verbatim;
/// the downstream parser decides what to make of them.
pub fn denormalize(skeleton: &Value, overlay: &EntityTable, base: &EntityTable) -> Value {
  let mut in_flight = HashSet::new();
  resolve(skeleton, overlay, base, &mut in_flight)
}

fn resolve(
  value: &Value,
  overlay: &EntityTable,
  base: &EntityTable,
  in_flight: &mut HashSet<String>,
) -> Value {
  if let Some(key) = as_reference(value) {
    if in_flight.contains(key) {
      // Cycle on this path: leave the reference for the caller.
      return value.clone();
    }
    return match overlay.get(key).or_else(|| base.get(key)) {
      Some(entity) => {
        in_flight.insert(key.to_string());
        let resolved = resolve(entity, overlay, base, in_flight);
        in_flight.remove(key);
        resolved
      }
      None => value.clone(),
    };
  }

  match value {
    Value::Object(fields) => {
      let mut out = Map::new();
      for (name, child) in fields {
        out.insert(name.clone(), resolve(child, overlay, base, in_flight));
      }
      Value::Object(out)
    }
    Value::Array(items) => Value::Array(
      items
        .iter()
        .map(|item| resolve(item, overlay, base, in_flight))
        .collect(),
    ),
    scalar => scalar.clone(),
  }
}
