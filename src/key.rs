//! Canonical cache keys.
//!
//! Two key families: query keys (`name ":" canonical_json(variables)`) for
//! the query table, and entity keys (`typename ":" id`) for the entity
//! table. Query keys must be reverse-decodable so the fetch orchestrator
//! can rebuild a request from the key alone; query names and typenames
//! therefore must not contain `:`.

use serde_json::Value;

/// Serialize a JSON value in canonical form.
///
/// serde_json's default `Map` keeps object keys sorted, so two logically
/// equal variable sets always serialize to the same string.
pub fn canonical_json(value: &Value) -> String {
  serde_json::to_string(value).expect("JSON value serialization cannot fail")
}

/// Build the cache key for a query and its variables.
pub fn query_key(name: &str, variables: &Value) -> String {
  format!("{}:{}", name, canonical_json(variables))
}

/// Decode a query key back into its name and variables.
///
/// Splits on the first `:`; returns `None` if the separator is missing or
/// the variables part is not valid JSON.
pub fn parse_query_key(key: &str) -> Option<(String, Value)> {
  let (name, variables) = key.split_once(':')?;
  let variables = serde_json::from_str(variables).ok()?;
  Some((name.to_string(), variables))
}

/// Build the store key for an entity.
pub fn entity_key(typename: &str, id: &str) -> String {
  format!("{}:{}", typename, id)
}

/// Decode an entity key into its typename and id.
pub fn split_entity_key(key: &str) -> Option<(&str, &str)> {
  key.split_once(':')
}
