//! Fetch orchestration.
//!
//! Turns queued cache misses into transport effects and optimistic
//! mutations into commit-or-rollback flows. The cache functions here are
//! pure; concurrency lives entirely inside the effects, which are detached
//! tasks that eventually hand an outcome back to the host event loop. The
//! host routes a [`FetchOutcome`] into [`Cache::store_query`] and a
//! [`MutationOutcome`] into `commit_optimistic` or `rollback_optimistic`
//! on whatever its current cache value is at that point.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::key::parse_query_key;
use crate::registry::QueryRegistry;
use crate::transport::{post_graphql, HeaderProvider};

/// Response to a plain query fetch, ready for [`Cache::store_query`].
#[derive(Debug, Clone)]
pub struct FetchOutcome {
  pub name: String,
  pub variables: Value,
  pub result: Result<String, String>,
}

/// One queued query fetch, ready to execute.
pub struct FetchEffect {
  endpoint: String,
  name: String,
  variables: Value,
  query: String,
  headers: HeaderProvider,
}

impl FetchEffect {
  /// Query name this effect will fetch.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Variables the request carries.
  pub fn variables(&self) -> &Value {
    &self.variables
  }

  /// Query text the request carries.
  pub fn query(&self) -> &str {
    &self.query
  }

  /// Execute the fetch and produce the outcome for the host to dispatch.
  pub async fn run(self) -> FetchOutcome {
    let headers = (self.headers)();
    let result = post_graphql(&self.endpoint, &self.query, &self.variables, &headers).await;
    FetchOutcome {
      name: self.name,
      variables: self.variables,
      result,
    }
  }

  /// Detach the fetch on the runtime, delivering its outcome over `tx`.
  pub fn spawn(self, tx: mpsc::UnboundedSender<FetchOutcome>) {
    tokio::spawn(async move {
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(self.run().await);
    });
  }
}

impl fmt::Debug for FetchEffect {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FetchEffect")
      .field("endpoint", &self.endpoint)
      .field("name", &self.name)
      .field("variables", &self.variables)
      .finish_non_exhaustive()
  }
}

/// Drain the pending-fetch set into transport effects.
///
/// Every queued key is reverse-decoded into its query name and variables
/// and matched against the registry. Keys with no registered query text are
/// dropped without an entry, so they neither fetch nor sit in `Loading`
/// forever; the host sees a warning in its logs. Keys that produced an
/// effect transition to `Loading`, and the pending set is cleared.
pub fn process_pending<R: QueryRegistry>(
  cache: &Cache,
  registry: &R,
  now: DateTime<Utc>,
) -> (Cache, Vec<FetchEffect>) {
  let pending: Vec<String> = cache.pending_fetches.iter().cloned().collect();
  let mut next = cache.clone();
  let mut effects = Vec::new();

  for key in pending {
    let (name, variables) = match parse_query_key(&key) {
      Some(decoded) => decoded,
      None => {
        warn!(key = %key, "pending fetch key is not decodable, dropping");
        continue;
      }
    };

    match registry.get(&name) {
      Some(query) => {
        next = next.mark_loading(&name, &variables, now);
        effects.push(FetchEffect {
          endpoint: cache.endpoint().to_string(),
          name,
          variables,
          query: query.to_string(),
          headers: cache.header_provider.clone(),
        });
      }
      None => {
        warn!(query = %name, "no registered query text, dropping pending fetch");
      }
    }
  }

  next.pending_fetches.clear();
  debug!(effects = effects.len(), "drained pending fetches");
  (next, effects)
}

/// Response to an optimistic mutation.
///
/// `parsed` tells the host whether to commit; `body` is the raw text to
/// hand to [`Cache::commit_optimistic`] when it does.
#[derive(Debug, Clone)]
pub struct MutationOutcome<T> {
  pub mutation_id: String,
  pub parsed: Result<T, String>,
  pub body: String,
}

type ParserFn<T> = Box<dyn Fn(&str) -> Result<T, String> + Send>;

/// One optimistic mutation send, ready to execute.
pub struct MutationEffect<T> {
  endpoint: String,
  mutation_id: String,
  variables: Value,
  query: String,
  headers: HeaderProvider,
  parser: ParserFn<T>,
}

impl<T> MutationEffect<T> {
  /// Id of the mutation this effect belongs to.
  pub fn mutation_id(&self) -> &str {
    &self.mutation_id
  }

  /// Mutation text the request carries.
  pub fn query(&self) -> &str {
    &self.query
  }

  /// Variables the request carries.
  pub fn variables(&self) -> &Value {
    &self.variables
  }

  /// Execute the mutation and produce the outcome for the host to dispatch.
  ///
  /// A transport failure yields `parsed: Err` with an empty body; the host
  /// rolls back. A transport success runs the parser on the body, and the
  /// body rides along either way so a successful parse can be committed.
  pub async fn run(self) -> MutationOutcome<T> {
    let headers = (self.headers)();
    match post_graphql(&self.endpoint, &self.query, &self.variables, &headers).await {
      Ok(body) => {
        let parsed = (self.parser)(&body);
        MutationOutcome {
          mutation_id: self.mutation_id,
          parsed,
          body,
        }
      }
      Err(message) => MutationOutcome {
        mutation_id: self.mutation_id,
        parsed: Err(message),
        body: String::new(),
      },
    }
  }
}

impl<T: Send + 'static> MutationEffect<T> {
  /// Detach the mutation on the runtime, delivering its outcome over `tx`.
  pub fn spawn(self, tx: mpsc::UnboundedSender<MutationOutcome<T>>) {
    tokio::spawn(async move {
      let _ = tx.send(self.run().await);
    });
  }
}

impl<T> fmt::Debug for MutationEffect<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MutationEffect")
      .field("endpoint", &self.endpoint)
      .field("mutation_id", &self.mutation_id)
      .field("variables", &self.variables)
      .finish_non_exhaustive()
  }
}

/// Apply an optimistic update and build the transport effect for it.
///
/// Allocates the next mutation id, writes the updater's replacement entity
/// into the overlay, and returns the effect whose outcome carries the raw
/// body: on parse success the host calls `commit_optimistic(id, body)`,
/// otherwise `rollback_optimistic(id)`.
///
/// Unlike a queued query, an unregistered mutation name is a hard error:
/// the caller names it explicitly, and the overlay must never be applied
/// for a request that cannot be sent.
pub fn execute_optimistic_mutation<R, T, U, P>(
  cache: &Cache,
  registry: &R,
  name: &str,
  variables: &Value,
  entity_key: &str,
  updater: U,
  parser: P,
) -> Result<(Cache, String, MutationEffect<T>)>
where
  R: QueryRegistry,
  U: FnOnce(Option<&Value>) -> Value,
  P: Fn(&str) -> Result<T, String> + Send + 'static,
{
  let query = registry
    .get(name)
    .ok_or_else(|| eyre!("No registered mutation named '{}'", name))?;

  let mutation_id = format!("mutation-{}", cache.mutation_counter);
  let mut next = cache.apply_optimistic_update(&mutation_id, entity_key, updater);
  next.mutation_counter += 1;

  debug!(mutation = name, id = %mutation_id, entity = entity_key, "optimistic mutation dispatched");

  let effect = MutationEffect {
    endpoint: cache.endpoint().to_string(),
    mutation_id: mutation_id.clone(),
    variables: variables.clone(),
    query: query.to_string(),
    headers: cache.header_provider.clone(),
    parser: Box::new(parser),
  };
  Ok((next, mutation_id, effect))
}
