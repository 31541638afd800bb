//! Response normalization.
//!
//! Walks a parsed GraphQL response, extracts every entity (an object
//! carrying a string `id`) into a flat table keyed by `typename:id`, and
//! rewrites the tree into a *skeleton* in which each extracted entity is
//! replaced by a `{"__ref": key}` placeholder. Nested entities are
//! referenced, never inlined, so repeated extractions of the same entity
//! merge field-wise into one record.
//!
//! Relay-style connections get special handling: an array whose first
//! element wraps a `node` field is treated as a list of edges, and edges
//! repeating an already-seen node are dropped from the skeleton.

use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::debug;

use crate::key::entity_key;
use crate::store::{merge_entities, EntityTable};

/// Field name of the reference placeholder.
pub const REF_FIELD: &str = "__ref";

/// Wrapper segments ignored by typename inference.
const RESERVED_SEGMENTS: &[&str] = &["data", "results", "edges", "node"];

/// Result of normalizing one response tree.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
  /// Extracted entities, each one itself a skeleton.
  pub entities: EntityTable,
  /// The response tree with every entity replaced by a reference.
  pub skeleton: Value,
}

/// Normalize a response tree into an entity table and a skeleton.
pub fn extract(tree: &Value) -> Normalized {
  let mut entities = EntityTable::new();
  let mut path = Vec::new();
  let skeleton = walk(tree, &mut path, &mut entities);
  Normalized { entities, skeleton }
}

/// If `value` is a reference placeholder, return its entity key.
///
/// A placeholder is an object with exactly one field, `__ref`, holding a
/// string.
pub fn as_reference(value: &Value) -> Option<&str> {
  let fields = value.as_object()?;
  if fields.len() != 1 {
    return None;
  }
  fields.get(REF_FIELD)?.as_str()
}

/// Build a reference placeholder for an entity key.
pub fn reference(key: &str) -> Value {
  json!({ REF_FIELD: key })
}

/// Infer a typename from the response path when `__typename` is absent.
///
/// Scans the path from deepest to shallowest, skips the reserved wrapper
/// segments, singularizes the first remaining segment (one trailing `s`)
/// and upper-cases its first character. Falls back to `"Entity"` when no
/// segment qualifies. Heuristic by nature; responses should carry
/// `__typename` whenever possible.
pub fn infer_typename(path: &[String]) -> String {
  path
    .iter()
    .rev()
    .filter(|segment| !RESERVED_SEGMENTS.contains(&segment.as_str()))
    .find_map(|segment| {
      let singular = segment.strip_suffix('s').unwrap_or(segment);
      let mut chars = singular.chars();
      chars
        .next()
        .map(|first| first.to_uppercase().collect::<String>() + chars.as_str())
    })
    .unwrap_or_else(|| "Entity".to_string())
}

fn walk(value: &Value, path: &mut Vec<String>, entities: &mut EntityTable) -> Value {
  match value {
    Value::Object(fields) => match string_field(fields, "id") {
      Some(id) => extract_entity(fields, &id, path, entities),
      None => {
        let mut out = Map::new();
        for (name, child) in fields {
          path.push(name.clone());
          out.insert(name.clone(), walk(child, path, entities));
          path.pop();
        }
        Value::Object(out)
      }
    },
    Value::Array(items) => {
      if is_edge_array(items) {
        dedup_edges(items, path, entities)
      } else {
        Value::Array(items.iter().map(|item| walk(item, path, entities)).collect())
      }
    }
    scalar => scalar.clone(),
  }
}

/// Extract one entity: normalize its fields, merge it into the table under
/// its key, and return the reference that replaces it in the skeleton.
fn extract_entity(
  fields: &Map<String, Value>,
  id: &str,
  path: &mut Vec<String>,
  entities: &mut EntityTable,
) -> Value {
  let typename = match string_field(fields, "__typename") {
    Some(explicit) => explicit,
    None => infer_typename(path),
  };
  let key = entity_key(&typename, id);

  let mut entity = Map::new();
  for (name, child) in fields {
    path.push(name.clone());
    entity.insert(name.clone(), walk(child, path, entities));
    path.pop();
  }

  let entity = Value::Object(entity);
  let merged = match entities.get(&key) {
    // Same entity seen earlier in this response: field-wise merge.
    Some(existing) => merge_entities(existing, &entity),
    None => entity,
  };
  entities.insert(key.clone(), merged);

  reference(&key)
}

/// A connection-edges array: the first element is an object wrapping a
/// `node` field.
fn is_edge_array(items: &[Value]) -> bool {
  items
    .first()
    .and_then(Value::as_object)
    .map_or(false, |first| first.contains_key("node"))
}

/// Normalize an edges array, dropping edges whose node was already seen.
///
/// The first occurrence of a node is authoritative for this response;
/// later duplicates are dropped whole, their entities not re-emitted.
/// Edges whose node carries no id pass through without dedup. Intra-response
/// only: separate queries are never deduplicated against each other.
fn dedup_edges(items: &[Value], path: &mut Vec<String>, entities: &mut EntityTable) -> Value {
  let mut seen = HashSet::new();
  let mut out = Vec::new();

  for edge in items {
    if let Some(key) = edge_node_key(edge, path) {
      if !seen.insert(key.clone()) {
        debug!(node = %key, "dropping duplicate connection edge");
        continue;
      }
    }
    out.push(walk(edge, path, entities));
  }

  Value::Array(out)
}

/// Entity key of an edge's node, if the node is an object with a string id.
fn edge_node_key(edge: &Value, path: &[String]) -> Option<String> {
  let node = edge.get("node")?.as_object()?;
  let id = string_field(node, "id")?;

  let typename = match string_field(node, "__typename") {
    Some(explicit) => explicit,
    None => {
      let mut node_path = path.to_vec();
      node_path.push("node".to_string());
      infer_typename(&node_path)
    }
  };
  Some(entity_key(&typename, &id))
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
  fields.get(name).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_extracts_singleton_entity() {
    let tree = json!({
      "data": {
        "settings": {
          "__typename": "Settings",
          "id": "singleton",
          "domainAuthority": "fm.teal"
        }
      }
    });

    let normalized = extract(&tree);
    assert_eq!(normalized.entities.len(), 1);
    assert_eq!(
      normalized.entities["Settings:singleton"]["domainAuthority"],
      "fm.teal"
    );
    assert_eq!(
      normalized.skeleton["data"]["settings"],
      json!({"__ref": "Settings:singleton"})
    );
  }

  #[test]
  fn test_extracts_entities_from_array() {
    let tree = json!({
      "data": {
        "users": [
          {"__typename": "User", "id": "1", "name": "Alice"},
          {"__typename": "User", "id": "2", "name": "Bob"}
        ]
      }
    });

    let normalized = extract(&tree);
    assert!(normalized.entities.contains_key("User:1"));
    assert!(normalized.entities.contains_key("User:2"));
    assert_eq!(
      normalized.skeleton["data"]["users"],
      json!([{"__ref": "User:1"}, {"__ref": "User:2"}])
    );
  }

  #[test]
  fn test_no_entities_stored_verbatim() {
    let tree = json!({"data": {"count": 42, "message": "success"}});

    let normalized = extract(&tree);
    assert!(normalized.entities.is_empty());
    assert_eq!(normalized.skeleton, tree);
  }

  #[test]
  fn test_nested_entity_referenced_not_inlined() {
    let tree = json!({
      "data": {
        "post": {
          "__typename": "Post",
          "id": "1",
          "title": "Hi",
          "author": {"__typename": "User", "id": "1", "name": "Alice"}
        }
      }
    });

    let normalized = extract(&tree);
    assert_eq!(normalized.entities.len(), 2);
    assert_eq!(
      normalized.entities["Post:1"]["author"],
      json!({"__ref": "User:1"})
    );
    assert_eq!(normalized.entities["User:1"]["name"], "Alice");
  }

  #[test]
  fn test_typename_inferred_from_path() {
    // No __typename anywhere: "users" singularizes to "User".
    let tree = json!({"data": {"users": [{"id": "1", "name": "Alice"}]}});

    let normalized = extract(&tree);
    assert!(normalized.entities.contains_key("User:1"));
  }

  #[test]
  fn test_typename_inference_skips_wrappers() {
    let path: Vec<String> = ["data", "friends", "edges", "node"]
      .iter()
      .map(|s| s.to_string())
      .collect();
    assert_eq!(infer_typename(&path), "Friend");

    let bare: Vec<String> = vec!["data".to_string()];
    assert_eq!(infer_typename(&bare), "Entity");
  }

  #[test]
  fn test_non_string_id_is_not_an_entity() {
    let tree = json!({"data": {"thing": {"id": 7, "label": "numeric"}}});

    let normalized = extract(&tree);
    assert!(normalized.entities.is_empty());
    assert_eq!(normalized.skeleton, tree);
  }

  #[test]
  fn test_same_entity_merged_across_response() {
    let tree = json!({
      "data": {
        "viewer": {"__typename": "User", "id": "1", "name": "Alice"},
        "author": {"__typename": "User", "id": "1", "email": "a@example.com"}
      }
    });

    let normalized = extract(&tree);
    assert_eq!(normalized.entities.len(), 1);
    let user = &normalized.entities["User:1"];
    assert_eq!(user["name"], "Alice");
    assert_eq!(user["email"], "a@example.com");
  }

  #[test]
  fn test_duplicate_edges_dropped() {
    let tree = json!({
      "data": {
        "friends": {
          "edges": [
            {"cursor": "a", "node": {"__typename": "User", "id": "1", "name": "Alice"}},
            {"cursor": "b", "node": {"__typename": "User", "id": "2", "name": "Bob"}},
            {"cursor": "c", "node": {"__typename": "User", "id": "1", "name": "Alice"}}
          ]
        }
      }
    });

    let normalized = extract(&tree);
    let edges = normalized.skeleton["data"]["friends"]["edges"]
      .as_array()
      .unwrap();
    assert_eq!(edges.len(), 2);
    // The earliest occurrence survives.
    assert_eq!(edges[0]["cursor"], "a");
    assert_eq!(edges[1]["cursor"], "b");
    assert_eq!(normalized.entities.len(), 2);
  }

  #[test]
  fn test_idless_edges_pass_through() {
    let tree = json!({
      "data": {
        "items": {
          "edges": [
            {"node": {"label": "x"}},
            {"node": {"label": "x"}}
          ]
        }
      }
    });

    let normalized = extract(&tree);
    let edges = normalized.skeleton["data"]["items"]["edges"]
      .as_array()
      .unwrap();
    assert_eq!(edges.len(), 2);
  }

  #[test]
  fn test_edge_node_key_uses_inferred_typename() {
    // Node without __typename: inference runs with "node" appended to the
    // array's path, landing on the collection name.
    let tree = json!({
      "data": {
        "posts": {
          "edges": [
            {"node": {"id": "1", "title": "first"}},
            {"node": {"id": "1", "title": "dup"}}
          ]
        }
      }
    });

    let normalized = extract(&tree);
    assert_eq!(normalized.entities.len(), 1);
    assert!(normalized.entities.contains_key("Post:1"));
    assert_eq!(
      normalized.skeleton["data"]["posts"]["edges"]
        .as_array()
        .unwrap()
        .len(),
      1
    );
  }

  #[test]
  fn test_reference_helpers() {
    let value = reference("User:1");
    assert_eq!(as_reference(&value), Some("User:1"));

    // Anything beyond the single __ref field is not a placeholder.
    assert_eq!(as_reference(&json!({"__ref": "User:1", "x": 1})), None);
    assert_eq!(as_reference(&json!({"other": "User:1"})), None);
    assert_eq!(as_reference(&json!("User:1")), None);
  }
}
