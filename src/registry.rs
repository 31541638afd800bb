//! Query text registry.
//!
//! The cache stores no GraphQL query text itself; hosts supply it through
//! this trait when pending fetches are drained.

use std::collections::HashMap;

/// Source of GraphQL query text, keyed by operation name.
pub trait QueryRegistry {
  /// Query text for `name`, or `None` when the name is unknown.
  fn get(&self, name: &str) -> Option<&str>;
}

/// In-memory registry for hosts that compile their query text in.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
  queries: HashMap<String, String>,
}

impl StaticRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a named query.
  pub fn with_query(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
    self.queries.insert(name.into(), text.into());
    self
  }
}

impl QueryRegistry for StaticRegistry {
  fn get(&self, name: &str) -> Option<&str> {
    self.queries.get(name).map(String::as_str)
  }
}
