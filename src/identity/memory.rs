//! In-memory [`MappingStore`] for tests and dry runs.

use super::MappingStore;
use crate::error::StoreError;
use crate::types::EntityType;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryMappingStore {
    mappings: Mutex<BTreeMap<(EntityType, String), i64>>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.mappings.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn load_all(&self, entity: EntityType) -> Result<Vec<(String, i64)>, StoreError> {
        let mappings = self.mappings.lock().unwrap();
        Ok(mappings
            .iter()
            .filter(|((e, _), _)| *e == entity)
            .map(|((_, source_id), target_id)| (source_id.clone(), *target_id))
            .collect())
    }

    async fn lookup(&self, entity: EntityType, source_id: &str) -> Result<Option<i64>, StoreError> {
        let mappings = self.mappings.lock().unwrap();
        Ok(mappings.get(&(entity, source_id.to_string())).copied())
    }

    async fn lookup_target(
        &self,
        entity: EntityType,
        target_id: i64,
    ) -> Result<Option<String>, StoreError> {
        let mappings = self.mappings.lock().unwrap();
        Ok(mappings
            .iter()
            .find(|((e, _), t)| *e == entity && **t == target_id)
            .map(|((_, source_id), _)| source_id.clone()))
    }

    async fn insert(&self, entity: EntityType, pairs: &[(String, i64)]) -> Result<(), StoreError> {
        let mut mappings = self.mappings.lock().unwrap();
        for (source_id, target_id) in pairs {
            let clash = mappings
                .iter()
                .any(|((e, s), t)| *e == entity && *t == *target_id && s != source_id);
            if clash {
                return Err(StoreError::Constraint(format!(
                    "{} target {} already mapped",
                    entity, target_id
                )));
            }
            match mappings.get(&(entity, source_id.clone())) {
                Some(existing) if existing != target_id => {
                    return Err(StoreError::Constraint(format!(
                        "{} source {} already mapped",
                        entity, source_id
                    )));
                }
                _ => {}
            }
        }
        for (source_id, target_id) in pairs {
            mappings.insert((entity, source_id.clone()), *target_id);
        }
        Ok(())
    }

    async fn counts(&self) -> Result<BTreeMap<EntityType, usize>, StoreError> {
        let mappings = self.mappings.lock().unwrap();
        let mut counts = BTreeMap::new();
        for (entity, _) in mappings.keys() {
            *counts.entry(*entity).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
