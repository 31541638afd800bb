//! The cache value and its query table.
//!
//! `Cache` owns the normalized entity table, the optimistic overlay, the
//! per-query skeleton entries, and the set of pending fetches. Every
//! operation takes `&self` and returns a new `Cache`; the value a caller
//! holds is never mutated behind its back, so the host event loop can keep
//! the latest cache in one place and thread it through messages.
//!
//! Query entries move through `Loading`, `Fresh` and `Stale`:
//!
//! - absent -> `Loading` via [`Cache::mark_loading`] (a lookup miss queues
//!   the fetch but creates no entry)
//! - any -> `Fresh` via [`Cache::store_query`]
//! - `Fresh` -> `Stale` via [`Cache::mark_stale`]
//! - any -> absent via [`Cache::invalidate`] or [`Cache::clear`]

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

use crate::denormalize::denormalize;
use crate::key::{canonical_json, query_key};
use crate::normalize::extract;
use crate::query::{QueryResult, QueryStatus};
use crate::store::{merge_tables, EntityTable};
use crate::transport::{no_headers, HeaderProvider};

/// Stored form of a query response.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheData {
  /// Normalized tree with entities replaced by references.
  Skeleton(Value),
  /// Body that failed JSON parsing, kept verbatim.
  Raw(String),
}

/// One query-table entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  /// Stored response; `None` only while `Loading` with nothing fetched yet.
  pub data: Option<CacheData>,
  /// When the entry was stored (or marked loading, for empty entries).
  pub timestamp: DateTime<Utc>,
  /// Lifecycle state driving refetch decisions.
  pub status: QueryStatus,
}

/// Normalized GraphQL client cache with an optimistic overlay.
#[derive(Clone)]
pub struct Cache {
  pub(crate) endpoint: String,
  pub(crate) entities: EntityTable,
  pub(crate) optimistic_entities: EntityTable,
  /// mutation id -> entity key it overlaid.
  pub(crate) optimistic_mutations: HashMap<String, String>,
  pub(crate) queries: HashMap<String, CacheEntry>,
  /// Query keys awaiting dispatch, sorted for deterministic effect order.
  pub(crate) pending_fetches: BTreeSet<String>,
  pub(crate) header_provider: HeaderProvider,
  pub(crate) mutation_counter: u64,
}

impl Cache {
  /// Create an empty cache for the given GraphQL endpoint.
  pub fn new(endpoint: impl Into<String>) -> Self {
    Self::new_with_headers(endpoint, no_headers())
  }

  /// Create an empty cache with a header provider.
  ///
  /// The provider runs at effect-execution time, so credential changes on
  /// the host side take effect without rebuilding the cache.
  pub fn new_with_headers(endpoint: impl Into<String>, header_provider: HeaderProvider) -> Self {
    Self {
      endpoint: endpoint.into(),
      entities: EntityTable::new(),
      optimistic_entities: EntityTable::new(),
      optimistic_mutations: HashMap::new(),
      queries: HashMap::new(),
      pending_fetches: BTreeSet::new(),
      header_provider,
      mutation_counter: 0,
    }
  }

  /// The endpoint URL requests are sent to.
  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  /// An entity from the base table.
  pub fn entity(&self, key: &str) -> Option<&Value> {
    self.entities.get(key)
  }

  /// The entity value a read would see: overlay first, then base.
  pub fn visible_entity(&self, key: &str) -> Option<&Value> {
    self
      .optimistic_entities
      .get(key)
      .or_else(|| self.entities.get(key))
  }

  /// Number of entities in the base table.
  pub fn entity_count(&self) -> usize {
    self.entities.len()
  }

  /// Status of a stored query entry, if any.
  pub fn query_status(&self, name: &str, variables: &Value) -> Option<QueryStatus> {
    self.queries.get(&query_key(name, variables)).map(|e| e.status)
  }

  /// Whether any fetches are queued for dispatch.
  pub fn has_pending_fetches(&self) -> bool {
    !self.pending_fetches.is_empty()
  }

  /// Number of fetches queued for dispatch.
  pub fn pending_count(&self) -> usize {
    self.pending_fetches.len()
  }

  /// Answer a query from the cache.
  ///
  /// A miss queues the key for [`process_pending`](crate::process_pending)
  /// and returns `Loading`; an in-flight entry returns `Loading` unchanged.
  /// Otherwise the stored skeleton is denormalized against overlay-then-base
  /// and the serialized tree is handed to `parser`. A parser error surfaces
  /// as `Failed` while the entry stays cached, so a later parser can still
  /// succeed on the same data.
  pub fn lookup<T, P>(&self, name: &str, variables: &Value, parser: P) -> (Cache, QueryResult<T>)
  where
    P: FnOnce(&str) -> Result<T, String>,
  {
    let key = query_key(name, variables);

    let entry = match self.queries.get(&key) {
      Some(entry) => entry,
      None => {
        let mut next = self.clone();
        next.pending_fetches.insert(key);
        return (next, QueryResult::Loading);
      }
    };

    if entry.status.is_loading() {
      return (self.clone(), QueryResult::Loading);
    }

    let serialized = match &entry.data {
      Some(CacheData::Skeleton(skeleton)) => {
        let tree = denormalize(skeleton, &self.optimistic_entities, &self.entities);
        canonical_json(&tree)
      }
      Some(CacheData::Raw(body)) => body.clone(),
      None => return (self.clone(), QueryResult::Loading),
    };

    let result = match parser(&serialized) {
      Ok(data) => QueryResult::Data(data),
      Err(message) => QueryResult::Failed(format!("Parse error: {}", message)),
    };
    (self.clone(), result)
  }

  /// Store a response body for a query.
  ///
  /// A JSON body is normalized: its entities merge into the base table and
  /// its skeleton becomes a `Fresh` entry. A body that is not JSON is kept
  /// verbatim, still `Fresh`, so a later lookup surfaces the parser's error
  /// rather than losing the response.
  pub fn store_query(
    &self,
    name: &str,
    variables: &Value,
    body: &str,
    timestamp: DateTime<Utc>,
  ) -> Cache {
    let key = query_key(name, variables);
    let mut next = self.clone();

    let data = match serde_json::from_str::<Value>(body) {
      Ok(tree) => {
        let normalized = extract(&tree);
        debug!(
          query = name,
          entities = normalized.entities.len(),
          "storing normalized response"
        );
        next.entities = merge_tables(&next.entities, &normalized.entities);
        CacheData::Skeleton(normalized.skeleton)
      }
      Err(err) => {
        debug!(query = name, error = %err, "response body is not JSON, storing raw");
        CacheData::Raw(body.to_string())
      }
    };

    next.queries.insert(
      key,
      CacheEntry {
        data: Some(data),
        timestamp,
        status: QueryStatus::Fresh,
      },
    );
    next
  }

  /// Transition a query to `Loading`.
  ///
  /// An existing entry keeps its data and timestamp so stale data can still
  /// render while the refetch runs; a new entry starts empty.
  pub fn mark_loading(&self, name: &str, variables: &Value, timestamp: DateTime<Utc>) -> Cache {
    let key = query_key(name, variables);
    let mut next = self.clone();

    match next.queries.get_mut(&key) {
      Some(entry) => entry.status = QueryStatus::Loading,
      None => {
        next.queries.insert(
          key,
          CacheEntry {
            data: None,
            timestamp,
            status: QueryStatus::Loading,
          },
        );
      }
    }
    next
  }

  /// Flag a `Fresh` query for refetch. `Loading` entries are left alone.
  pub fn mark_stale(&self, name: &str, variables: &Value) -> Cache {
    let key = query_key(name, variables);
    let mut next = self.clone();

    if let Some(entry) = next.queries.get_mut(&key) {
      if entry.status.is_fresh() {
        entry.status = QueryStatus::Stale;
      }
    }
    next
  }

  /// Flag every `Fresh` query for refetch, e.g. after a reconnect.
  pub fn mark_all_stale(&self) -> Cache {
    let mut next = self.clone();
    for entry in next.queries.values_mut() {
      if entry.status.is_fresh() {
        entry.status = QueryStatus::Stale;
      }
    }
    next
  }

  /// Remove a query entry. In-flight requests are not cancelled; a late
  /// response is only observed if the key is requested again.
  pub fn invalidate(&self, name: &str, variables: &Value) -> Cache {
    let mut next = self.clone();
    next.queries.remove(&query_key(name, variables));
    next
  }

  /// Remove every query entry and queued fetch. Entities stay: they are
  /// identity-keyed facts, not per-query state.
  pub fn clear(&self) -> Cache {
    let mut next = self.clone();
    next.queries.clear();
    next.pending_fetches.clear();
    next
  }
}

impl fmt::Debug for Cache {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache")
      .field("endpoint", &self.endpoint)
      .field("entities", &self.entities.len())
      .field("optimistic_entities", &self.optimistic_entities.len())
      .field("queries", &self.queries.len())
      .field("pending_fetches", &self.pending_fetches.len())
      .field("mutation_counter", &self.mutation_counter)
      .finish_non_exhaustive()
  }
}
