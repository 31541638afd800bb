//! Query result and status types.
//!
//! A lookup answers with `QueryResult<T>`: either the parsed data, a parse
//! failure, or `Loading` while a fetch is queued or in flight. `QueryStatus`
//! is the lifecycle state of a stored query entry.
//!
//! # Example
//!
//! ```ignore
//! let (cache, result) = cache.lookup("GetSettings", &json!({}), parse_settings);
//! match result {
//!     QueryResult::Loading => render_spinner(),
//!     QueryResult::Data(settings) => render_settings(&settings),
//!     QueryResult::Failed(e) => render_error(&e),
//! }
//! ```

use serde::{Deserialize, Serialize};

/// The outcome of a single cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult<T> {
  /// No usable entry yet; a fetch has been queued or is in flight.
  Loading,
  /// The stored data could not be parsed.
  Failed(String),
  /// Parsed data, denormalized against the latest entity state.
  Data(T),
}

impl<T> QueryResult<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryResult::Loading)
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, QueryResult::Failed(_))
  }

  pub fn is_data(&self) -> bool {
    matches!(self, QueryResult::Data(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryResult::Data(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryResult::Failed(e) => Some(e),
      _ => None,
    }
  }
}

/// Lifecycle state of a stored query entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
  /// A fetch is in flight; the entry may hold no data yet.
  Loading,
  /// Data stored and considered current.
  Fresh,
  /// Data stored but flagged for refetch.
  Stale,
}

impl QueryStatus {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryStatus::Loading)
  }

  pub fn is_fresh(&self) -> bool {
    matches!(self, QueryStatus::Fresh)
  }

  pub fn is_stale(&self) -> bool {
    matches!(self, QueryStatus::Stale)
  }
}
