//! Optimistic overlay operations.
//!
//! An optimistic mutation writes its predicted entity into the overlay,
//! where it shadows the base table during denormalization. The overlay
//! entry lives until the mutation is committed (the server's response
//! merged into base, the prediction dropped) or rolled back (the
//! prediction dropped, base untouched).

use serde_json::Value;
use tracing::debug;

use crate::cache::Cache;
use crate::normalize::extract;
use crate::store::merge_tables;

impl Cache {
  /// Apply a provisional entity value for an in-flight mutation.
  ///
  /// `updater` receives the currently visible value for `entity_key`
  /// (overlay first, then base, else `None`) and returns the full
  /// replacement object. When two mutations target the same entity the
  /// second overwrites the first in the overlay and rolling back the second
  /// does not restore the first; callers that care must serialize
  /// conflicting mutations.
  pub fn apply_optimistic_update<F>(&self, mutation_id: &str, entity_key: &str, updater: F) -> Cache
  where
    F: FnOnce(Option<&Value>) -> Value,
  {
    let replacement = updater(self.visible_entity(entity_key));

    let mut next = self.clone();
    next
      .optimistic_entities
      .insert(entity_key.to_string(), replacement);
    next
      .optimistic_mutations
      .insert(mutation_id.to_string(), entity_key.to_string());

    debug!(mutation = mutation_id, entity = entity_key, "optimistic update applied");
    next
  }

  /// Discard a mutation's provisional value, restoring the base view.
  ///
  /// Unknown mutation ids are a no-op.
  pub fn rollback_optimistic(&self, mutation_id: &str) -> Cache {
    let entity_key = match self.optimistic_mutations.get(mutation_id) {
      Some(key) => key.clone(),
      None => return self.clone(),
    };

    let mut next = self.clone();
    next.optimistic_mutations.remove(mutation_id);
    next.optimistic_entities.remove(&entity_key);

    debug!(mutation = mutation_id, entity = %entity_key, "optimistic update rolled back");
    next
  }

  /// Replace a mutation's provisional value with the server's response.
  ///
  /// The response body is normalized and merged into the base table, then
  /// the overlay and mutation records are dropped. The records are dropped
  /// even when the body does not parse, since the authoritative response
  /// already flowed through `store_query` in the same update cycle. Unknown
  /// mutation ids are a no-op.
  pub fn commit_optimistic(&self, mutation_id: &str, body: &str) -> Cache {
    let entity_key = match self.optimistic_mutations.get(mutation_id) {
      Some(key) => key.clone(),
      None => return self.clone(),
    };

    let mut next = self.clone();
    if let Ok(tree) = serde_json::from_str::<Value>(body) {
      let normalized = extract(&tree);
      next.entities = merge_tables(&next.entities, &normalized.entities);
    }
    next.optimistic_mutations.remove(mutation_id);
    next.optimistic_entities.remove(&entity_key);

    debug!(mutation = mutation_id, entity = %entity_key, "optimistic update committed");
    next
  }

  /// Whether any optimistic mutation is still in flight.
  pub fn has_pending_mutations(&self) -> bool {
    !self.optimistic_mutations.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::DateTime;
  use serde_json::json;

  const SETTINGS_BODY: &str = r#"{"data":{"settings":{"__typename":"Settings","id":"singleton","domainAuthority":"fm.teal"}}}"#;

  fn identity(body: &str) -> Result<Value, String> {
    serde_json::from_str(body).map_err(|e| e.to_string())
  }

  fn seeded_cache() -> Cache {
    Cache::new("https://example.com/graphql").store_query(
      "GetSettings",
      &json!({}),
      SETTINGS_BODY,
      DateTime::from_timestamp(0, 0).unwrap(),
    )
  }

  #[test]
  fn test_optimistic_update_shadows_lookup_until_rollback() {
    let cache = seeded_cache();

    let cache = cache.apply_optimistic_update("m1", "Settings:singleton", |current| {
      let mut updated = current.unwrap().clone();
      updated["domainAuthority"] = json!("xyz.statusphere");
      updated
    });

    let (cache, result) = cache.lookup("GetSettings", &json!({}), identity);
    assert_eq!(
      result.data().unwrap()["data"]["settings"]["domainAuthority"],
      "xyz.statusphere"
    );
    assert!(cache.has_pending_mutations());

    let cache = cache.rollback_optimistic("m1");
    let (cache, result) = cache.lookup("GetSettings", &json!({}), identity);
    assert_eq!(
      result.data().unwrap()["data"]["settings"]["domainAuthority"],
      "fm.teal"
    );
    assert!(!cache.has_pending_mutations());
  }

  #[test]
  fn test_rollback_restores_previous_visible_value() {
    let cache = seeded_cache();
    let before = cache.visible_entity("Settings:singleton").cloned();

    let cache = cache
      .apply_optimistic_update("m1", "Settings:singleton", |_| json!({"id": "singleton"}))
      .rollback_optimistic("m1");

    assert_eq!(cache.visible_entity("Settings:singleton").cloned(), before);
  }

  #[test]
  fn test_commit_merges_into_base_and_clears_overlay() {
    let mutation_body = r#"{"data":{"updateDomainAuthority":{"__typename":"Settings","id":"singleton","domainAuthority":"xyz.statusphere"}}}"#;

    let cache = seeded_cache().apply_optimistic_update("m1", "Settings:singleton", |current| {
      let mut updated = current.unwrap().clone();
      updated["domainAuthority"] = json!("xyz.statusphere");
      updated
    });

    // The authoritative response lands first, then the commit.
    let cache = cache.store_query(
      "UpdateDomainAuthority",
      &json!({}),
      mutation_body,
      DateTime::from_timestamp(1, 0).unwrap(),
    );
    let cache = cache.commit_optimistic("m1", mutation_body);

    assert!(cache.optimistic_entities.is_empty());
    assert!(cache.optimistic_mutations.is_empty());
    assert_eq!(
      cache.entity("Settings:singleton").unwrap()["domainAuthority"],
      "xyz.statusphere"
    );
  }

  #[test]
  fn test_commit_with_unparseable_body_still_clears_records() {
    let cache = seeded_cache()
      .apply_optimistic_update("m1", "Settings:singleton", |_| json!({"id": "singleton"}));

    let cache = cache.commit_optimistic("m1", "not json");
    assert!(cache.optimistic_entities.is_empty());
    assert!(cache.optimistic_mutations.is_empty());
  }

  #[test]
  fn test_unknown_mutation_id_is_a_noop() {
    let cache = seeded_cache();

    let rolled = cache.rollback_optimistic("nope");
    assert_eq!(rolled.entity_count(), cache.entity_count());
    assert!(!rolled.has_pending_mutations());

    let committed = cache.commit_optimistic("nope", SETTINGS_BODY);
    assert!(committed.optimistic_mutations.is_empty());
    // An unknown id must not smuggle entities into the base table.
    assert_eq!(committed.entity_count(), cache.entity_count());
  }

  #[test]
  fn test_second_mutation_on_same_entity_wins() {
    let cache = seeded_cache()
      .apply_optimistic_update("m1", "Settings:singleton", |_| {
        json!({"id": "singleton", "domainAuthority": "first"})
      })
      .apply_optimistic_update("m2", "Settings:singleton", |_| {
        json!({"id": "singleton", "domainAuthority": "second"})
      });

    assert_eq!(
      cache.visible_entity("Settings:singleton").unwrap()["domainAuthority"],
      "second"
    );

    // Rolling back the second does not restore the first.
    let cache = cache.rollback_optimistic("m2");
    assert_eq!(
      cache.visible_entity("Settings:singleton").unwrap()["domainAuthority"],
      "fm.teal"
    );
    assert!(cache.has_pending_mutations());
  }

  #[test]
  fn test_updater_sees_overlay_value_when_stacked() {
    let cache = seeded_cache()
      .apply_optimistic_update("m1", "Settings:singleton", |_| {
        json!({"id": "singleton", "domainAuthority": "first"})
      })
      .apply_optimistic_update("m2", "Settings:singleton", |current| {
        // The second updater sees the first's provisional value.
        assert_eq!(current.unwrap()["domainAuthority"], "first");
        json!({"id": "singleton", "domainAuthority": "second"})
      });

    assert!(cache.has_pending_mutations());
  }

  #[test]
  fn test_updater_sees_none_for_unknown_entity() {
    let cache = Cache::new("https://example.com/graphql");
    let cache = cache.apply_optimistic_update("m1", "Draft:1", |current| {
      assert!(current.is_none());
      json!({"id": "1", "body": "provisional"})
    });

    assert_eq!(cache.visible_entity("Draft:1").unwrap()["body"], "provisional");
    assert!(cache.entity("Draft:1").is_none());
  }
}
