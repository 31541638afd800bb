//! Normalized GraphQL client cache with optimistic mutation support.
//!
//! Sits between a view layer and a GraphQL endpoint. Queries are answered
//! from the local store when possible; misses become deduplicated network
//! fetches. Responses are normalized: every object carrying a string `id`
//! is extracted into a flat entity table and referenced by `typename:id`,
//! so a mutation to one entity shows up in every query that referenced it.
//! Mutations can be applied optimistically and later committed with the
//! server's response or rolled back.
//!
//! The [`Cache`] is an immutable value: every operation returns a new one,
//! and nothing in the core suspends or shares mutable state. Network work
//! happens only inside the effects produced by [`process_pending`] and
//! [`execute_optimistic_mutation`], which the host runs and routes back.
//!
//! # Example
//!
//! ```ignore
//! let registry = StaticRegistry::new()
//!     .with_query("GetSettings", include_str!("queries/get_settings.graphql"));
//! let mut cache = Cache::new("https://api.example.com/graphql");
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!
//! // In the view: a miss returns Loading and queues the fetch.
//! let (next, result) = cache.lookup("GetSettings", &json!({}), parse_settings);
//! cache = next;
//!
//! // In the event loop tick: drain misses into detached fetches.
//! let (next, effects) = process_pending(&cache, &registry, Utc::now());
//! cache = next;
//! for effect in effects {
//!     effect.spawn(tx.clone());
//! }
//!
//! // When an outcome arrives: fold it into the current cache value.
//! while let Some(outcome) = rx.recv().await {
//!     if let Ok(body) = outcome.result {
//!         cache = cache.store_query(&outcome.name, &outcome.variables, &body, Utc::now());
//!     }
//! }
//! ```

mod cache;
mod denormalize;
mod fetch;
mod key;
mod normalize;
mod optimistic;
mod query;
mod registry;
mod store;
mod transport;

pub use cache::{Cache, CacheData, CacheEntry};
pub use denormalize::denormalize;
pub use fetch::{
  execute_optimistic_mutation, process_pending, FetchEffect, FetchOutcome, MutationEffect,
  MutationOutcome,
};
pub use key::{canonical_json, entity_key, parse_query_key, query_key, split_entity_key};
pub use normalize::{as_reference, extract, infer_typename, reference, Normalized, REF_FIELD};
pub use query::{QueryResult, QueryStatus};
pub use registry::{QueryRegistry, StaticRegistry};
pub use store::{merge_entities, merge_tables, EntityTable};
pub use transport::{no_headers, post_graphql, HeaderProvider};
