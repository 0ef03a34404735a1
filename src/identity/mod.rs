//! Identity-resolution cache.
//!
//! Translates source platform identifiers into target row ids. The cache is
//! append-only: a source id is bound to exactly one target id, once, and a
//! target id is owned by exactly one source id per entity type. Every
//! binding is persisted through a [`MappingStore`] so a restarted run skips
//! whatever already migrated.

mod memory;

pub use memory::MemoryMappingStore;

use crate::error::{MigrationError, StoreError};
use crate::types::EntityType;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Persistence for mapping records `(entity_type, source_id, target_id)`.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Every mapping recorded for `entity`.
    async fn load_all(&self, entity: EntityType) -> Result<Vec<(String, i64)>, StoreError>;

    async fn lookup(&self, entity: EntityType, source_id: &str) -> Result<Option<i64>, StoreError>;

    /// Reverse lookup, used to keep the mapping bijective.
    async fn lookup_target(
        &self,
        entity: EntityType,
        target_id: i64,
    ) -> Result<Option<String>, StoreError>;

    /// Persist new mappings atomically. Pairs must already be checked for
    /// conflicts; an exact duplicate of an existing pair is ignored.
    async fn insert(&self, entity: EntityType, pairs: &[(String, i64)]) -> Result<(), StoreError>;

    /// Number of mappings per entity type.
    async fn counts(&self) -> Result<BTreeMap<EntityType, usize>, StoreError>;
}

#[derive(Default)]
struct CacheState {
    forward: HashMap<EntityType, HashMap<String, i64>>,
    reverse: HashMap<EntityType, HashMap<i64, String>>,
    preloaded: HashSet<EntityType>,
}

impl CacheState {
    fn get(&self, entity: EntityType, source_id: &str) -> Option<i64> {
        self.forward.get(&entity)?.get(source_id).copied()
    }

    fn owner_of(&self, entity: EntityType, target_id: i64) -> Option<&String> {
        self.reverse.get(&entity)?.get(&target_id)
    }

    fn insert(&mut self, entity: EntityType, source_id: String, target_id: i64) {
        self.reverse
            .entry(entity)
            .or_default()
            .insert(target_id, source_id.clone());
        self.forward
            .entry(entity)
            .or_default()
            .insert(source_id, target_id);
    }
}

/// Shared, append-only source-id → target-id cache.
pub struct IdentityCache {
    store: Arc<dyn MappingStore>,
    state: RwLock<CacheState>,
}

impl IdentityCache {
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        Self {
            store,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Bulk-load every mapping of `entity` so later lookups stay in memory.
    /// Returns the number of mappings loaded.
    pub async fn preload(&self, entity: EntityType) -> Result<usize, StoreError> {
        let pairs = self.store.load_all(entity).await?;
        let count = pairs.len();
        let mut state = self.state.write().await;
        for (source_id, target_id) in pairs {
            state.insert(entity, source_id, target_id);
        }
        state.preloaded.insert(entity);
        debug!(entity = %entity, count, "Preloaded id mappings");
        Ok(count)
    }

    pub async fn is_preloaded(&self, entity: EntityType) -> bool {
        self.state.read().await.preloaded.contains(&entity)
    }

    /// Resolve one source id. Falls back to a live store lookup when the
    /// entity type was not preloaded; never fails.
    pub async fn resolve(&self, source_id: &str, entity: EntityType) -> Option<i64> {
        {
            let state = self.state.read().await;
            if let Some(id) = state.get(entity, source_id) {
                return Some(id);
            }
            if state.preloaded.contains(&entity) {
                return None;
            }
        }

        match self.store.lookup(entity, source_id).await {
            Ok(Some(target_id)) => {
                let mut state = self.state.write().await;
                if state.get(entity, source_id).is_none() {
                    state.insert(entity, source_id.to_string(), target_id);
                }
                Some(target_id)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(entity = %entity, source_id, error = %e, "Live mapping lookup failed");
                None
            }
        }
    }

    /// Resolve many source ids, preserving order; `None` for unresolved.
    pub async fn resolve_many(&self, source_ids: &[String], entity: EntityType) -> Vec<Option<i64>> {
        join_all(source_ids.iter().map(|id| self.resolve(id, entity))).await
    }

    pub async fn is_already_migrated(&self, source_id: &str, entity: EntityType) -> bool {
        self.resolve(source_id, entity).await.is_some()
    }

    /// Record a single mapping.
    pub async fn record(
        &self,
        source_id: &str,
        target_id: i64,
        entity: EntityType,
    ) -> Result<(), MigrationError> {
        self.record_batch(&[(source_id.to_string(), target_id)], entity)
            .await
    }

    /// Record many mappings. Pairs already present are ignored; any pair
    /// that would break bijectivity rejects the whole batch before anything
    /// is written.
    pub async fn record_batch(
        &self,
        pairs: &[(String, i64)],
        entity: EntityType,
    ) -> Result<(), MigrationError> {
        if pairs.is_empty() {
            return Ok(());
        }

        // Writers are serialized by holding the write lock for the whole batch.
        let mut state = self.state.write().await;
        let preloaded = state.preloaded.contains(&entity);

        let mut fresh: Vec<(String, i64)> = Vec::new();
        let mut batch_sources: HashMap<&str, i64> = HashMap::new();
        let mut batch_targets: HashMap<i64, &str> = HashMap::new();

        for (source_id, target_id) in pairs {
            let existing_target = match state.get(entity, source_id) {
                Some(id) => Some(id),
                None if preloaded => None,
                None => self.store.lookup(entity, source_id).await?,
            };
            if let Some(existing) = existing_target {
                if existing == *target_id {
                    continue;
                }
                return Err(MigrationError::MappingConflict {
                    entity,
                    source_id: source_id.clone(),
                    target_id: *target_id,
                    existing: format!("{} -> {}", source_id, existing),
                });
            }

            let existing_owner = match state.owner_of(entity, *target_id) {
                Some(owner) => Some(owner.clone()),
                None if preloaded => None,
                None => self.store.lookup_target(entity, *target_id).await?,
            };
            if let Some(owner) = existing_owner {
                return Err(MigrationError::MappingConflict {
                    entity,
                    source_id: source_id.clone(),
                    target_id: *target_id,
                    existing: format!("{} -> {}", owner, target_id),
                });
            }

            match (batch_sources.get(source_id.as_str()), batch_targets.get(target_id)) {
                (Some(t), _) if t == target_id => continue,
                (None, None) => {}
                (Some(t), _) => {
                    return Err(MigrationError::MappingConflict {
                        entity,
                        source_id: source_id.clone(),
                        target_id: *target_id,
                        existing: format!("{} -> {} in the same batch", source_id, t),
                    });
                }
                (None, Some(owner)) => {
                    return Err(MigrationError::MappingConflict {
                        entity,
                        source_id: source_id.clone(),
                        target_id: *target_id,
                        existing: format!("{} -> {} in the same batch", owner, target_id),
                    });
                }
            }
            batch_sources.insert(source_id, *target_id);
            batch_targets.insert(*target_id, source_id);
            fresh.push((source_id.clone(), *target_id));
        }

        if fresh.is_empty() {
            return Ok(());
        }

        self.store.insert(entity, &fresh).await?;
        for (source_id, target_id) in fresh {
            state.insert(entity, source_id, target_id);
        }
        Ok(())
    }

    /// Mapping counts per entity type, as persisted.
    pub async fn stats(&self) -> Result<BTreeMap<EntityType, usize>, StoreError> {
        self.store.counts().await
    }
}
