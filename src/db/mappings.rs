//! Mapping record persistence (`id_mappings` table).

use super::{Database, now_ms};
use crate::error::StoreError;
use crate::identity::MappingStore;
use crate::types::EntityType;
use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use std::collections::BTreeMap;

#[async_trait]
impl MappingStore for Database {
    async fn load_all(&self, entity: EntityType) -> Result<Vec<(String, i64)>, StoreError> {
        let pairs = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT source_id, target_id FROM id_mappings WHERE entity_type = ?1",
            )?;
            let rows = stmt.query_map(params![entity.as_str()], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })?;
            let mut pairs = Vec::new();
            for row in rows {
                pairs.push(row?);
            }
            Ok(pairs)
        })?;
        Ok(pairs)
    }

    async fn lookup(&self, entity: EntityType, source_id: &str) -> Result<Option<i64>, StoreError> {
        let target = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT target_id FROM id_mappings WHERE entity_type = ?1 AND source_id = ?2",
                    params![entity.as_str(), source_id],
                    |r| r.get::<_, i64>(0),
                )
                .optional()?)
        })?;
        Ok(target)
    }

    async fn lookup_target(
        &self,
        entity: EntityType,
        target_id: i64,
    ) -> Result<Option<String>, StoreError> {
        let source = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT source_id FROM id_mappings WHERE entity_type = ?1 AND target_id = ?2",
                    params![entity.as_str(), target_id],
                    |r| r.get::<_, String>(0),
                )
                .optional()?)
        })?;
        Ok(source)
    }

    async fn insert(&self, entity: EntityType, pairs: &[(String, i64)]) -> Result<(), StoreError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let created_at = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                // Exact duplicates are ignored by the primary key; a pair that
                // reuses a target id fails the UNIQUE(entity_type, target_id)
                // constraint and rolls back the batch.
                let mut stmt = tx.prepare(
                    "INSERT INTO id_mappings (entity_type, source_id, target_id, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(entity_type, source_id) DO NOTHING",
                )?;
                for (source_id, target_id) in pairs {
                    stmt.execute(params![entity.as_str(), source_id, target_id, created_at])?;
                }
            }
            tx.commit()?;
            Ok(())
        })?;
        Ok(())
    }

    async fn counts(&self) -> Result<BTreeMap<EntityType, usize>, StoreError> {
        let counts = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT entity_type, COUNT(*) FROM id_mappings GROUP BY entity_type",
            )?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
            let mut counts = BTreeMap::new();
            for row in rows {
                let (name, count) = row?;
                if let Some(entity) = EntityType::parse(&name) {
                    counts.insert(entity, count as usize);
                }
            }
            Ok(counts)
        })?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityCache;
    use std::sync::Arc;

    #[tokio::test]
    async fn mappings_persist_and_reload() {
        let db = Database::open_in_memory().unwrap();
        db.insert(
            EntityType::Company,
            &[("c1".to_string(), 1), ("c2".to_string(), 2)],
        )
        .await
        .unwrap();

        let cache = IdentityCache::new(Arc::new(db.clone()));
        assert_eq!(cache.preload(EntityType::Company).await.unwrap(), 2);
        assert_eq!(cache.resolve("c2", EntityType::Company).await, Some(2));
        assert_eq!(db.lookup_target(EntityType::Company, 1).await.unwrap(), Some("c1".into()));
    }

    #[tokio::test]
    async fn duplicate_target_is_a_constraint_error() {
        let db = Database::open_in_memory().unwrap();
        db.insert(EntityType::Tag, &[("t1".to_string(), 1)]).await.unwrap();
        let err = db
            .insert(EntityType::Tag, &[("t2".to_string(), 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn counts_group_by_entity() {
        let db = Database::open_in_memory().unwrap();
        db.insert(EntityType::Tag, &[("t1".to_string(), 1)]).await.unwrap();
        db.insert(EntityType::User, &[("u1".to_string(), 1), ("u2".to_string(), 2)])
            .await
            .unwrap();
        let counts = db.counts().await.unwrap();
        assert_eq!(counts.get(&EntityType::Tag), Some(&1));
        assert_eq!(counts.get(&EntityType::User), Some(&2));
    }
}
