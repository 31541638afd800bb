//! Entity table operations.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Flat table of extracted entities, keyed by `typename:id`.
pub type EntityTable = HashMap<String, Value>;

/// Merge two versions of the same entity.
///
/// Field-wise union: a field present in `new` replaces the whole value from
/// `existing`; fields absent from `new` are preserved. Values are never
/// deep-merged. Nested entities were already pulled out by reference before
/// merge runs, so a field is always a scalar, a reference, or plain
/// structure the server sent whole.
pub fn merge_entities(existing: &Value, new: &Value) -> Value {
  match (existing.as_object(), new.as_object()) {
    (Some(old_fields), Some(new_fields)) => {
      let mut merged: Map<String, Value> = old_fields.clone();
      for (name, value) in new_fields {
        merged.insert(name.clone(), value.clone());
      }
      Value::Object(merged)
    }
    // Non-object on either side: the newer version wins outright.
    _ => new.clone(),
  }
}

/// Merge an incoming entity table into a base table.
///
/// Keys new to `base` are inserted; keys present in both are merged with
/// [`merge_entities`].
pub fn merge_tables(base: &EntityTable, incoming: &EntityTable) -> EntityTable {
  let mut merged = base.clone();
  for (key, entity) in incoming {
    let value = match merged.get(key) {
      Some(existing) => merge_entities(existing, entity),
      None => entity.clone(),
    };
    merged.insert(key.clone(), value);
  }
  merged
}
