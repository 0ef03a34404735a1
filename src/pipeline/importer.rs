//! Chunked transform-and-insert for one entity stage.

use super::{ImportOptions, ProgressTracker};
use crate::error::{MigrationError, RecordError, StoreError};
use crate::identity::IdentityCache;
use crate::source::fields::value_to_string;
use crate::store::TargetStore;
use crate::transform::{Links, Reference, Resolved, ResolvedRef, Transformer};
use crate::types::{Row, StageStats};
use futures::future::join_all;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

struct Candidate<R> {
    source_id: String,
    record: R,
}

/// Imports the records of one stage through a [`Transformer`].
pub struct BatchImporter<'a, T: Transformer> {
    transformer: &'a T,
    store: &'a dyn TargetStore,
    cache: &'a IdentityCache,
    options: &'a ImportOptions,
}

impl<'a, T: Transformer> BatchImporter<'a, T> {
    pub fn new(
        transformer: &'a T,
        store: &'a dyn TargetStore,
        cache: &'a IdentityCache,
        options: &'a ImportOptions,
    ) -> Self {
        Self {
            transformer,
            store,
            cache,
            options,
        }
    }

    /// Import raw source records. Only fatal errors (mapping conflicts)
    /// are returned; everything else ends up in the stats.
    pub async fn run(&self, records: Vec<Value>) -> Result<StageStats, MigrationError> {
        let entity = self.transformer.entity();
        let mut stats = StageStats::default();
        let candidates = self.decode(records, &mut stats);

        let mut progress = ProgressTracker::new(
            entity.as_str(),
            candidates.len(),
            self.options.progress_interval,
        );
        let mut seen: HashSet<&str> = HashSet::new();

        for chunk in candidates.chunks(self.options.batch_size.max(1)) {
            let mut pending: Vec<&Candidate<T::Record>> = Vec::with_capacity(chunk.len());
            for candidate in chunk {
                if !seen.insert(candidate.source_id.as_str()) {
                    debug!(entity = %entity, source_id = %candidate.source_id, "Duplicate source record");
                    stats.skipped += 1;
                } else if self
                    .cache
                    .is_already_migrated(&candidate.source_id, entity)
                    .await
                {
                    stats.skipped += 1;
                } else {
                    pending.push(candidate);
                }
            }

            if !pending.is_empty() {
                let label = format!("{} chunk", entity);
                match self
                    .options
                    .retry
                    .run(&label, || self.import_chunk(&pending))
                    .await
                {
                    Ok(chunk_stats) => stats.absorb(chunk_stats),
                    Err(MigrationError::Store(e)) => {
                        warn!(
                            entity = %entity,
                            rows = pending.len(),
                            first = %pending[0].source_id,
                            error = %e,
                            "Chunk failed; continuing with next chunk"
                        );
                        stats.failed += pending.len();
                    }
                    Err(e) => return Err(e),
                }
            }
            progress.advance(chunk.len());
        }

        info!(
            stage = %entity,
            migrated = stats.migrated,
            skipped = stats.skipped,
            failed = stats.failed,
            elapsed_ms = progress.elapsed().as_millis() as u64,
            dry_run = self.options.dry_run,
            "Import finished"
        );
        Ok(stats)
    }

    /// Decode, drop records without an id, apply the parent filter and the
    /// per-stage limit.
    fn decode(&self, records: Vec<Value>, stats: &mut StageStats) -> Vec<Candidate<T::Record>> {
        let entity = self.transformer.entity();
        let mut candidates = Vec::with_capacity(records.len());

        for value in records {
            if let Some(limit) = self.options.limit
                && candidates.len() + stats.failed >= limit
            {
                break;
            }
            let raw_id = value
                .get("_id")
                .and_then(value_to_string)
                .unwrap_or_else(|| "<missing>".to_string());

            let record: T::Record = match serde_json::from_value(value) {
                Ok(record) => record,
                Err(e) => {
                    let err = RecordError::Decode {
                        source_id: raw_id,
                        reason: e.to_string(),
                    };
                    warn!(entity = %entity, error = %err, "Dropping record");
                    stats.failed += 1;
                    continue;
                }
            };

            let Some(source_id) = self.transformer.source_id(&record).map(str::to_string) else {
                let err = RecordError::MissingField {
                    source_id: raw_id,
                    field: "_id",
                };
                warn!(entity = %entity, error = %err, "Dropping record");
                stats.failed += 1;
                continue;
            };

            if let Some(parent) = self.options.parent.as_deref()
                && self.transformer.parent_source_id(&record) != Some(parent)
            {
                continue;
            }

            candidates.push(Candidate { source_id, record });
        }
        candidates
    }

    async fn import_chunk(
        &self,
        pending: &[&Candidate<T::Record>],
    ) -> Result<StageStats, MigrationError> {
        let entity = self.transformer.entity();
        let mut stats = StageStats::default();

        let references: Vec<Vec<Reference>> = pending
            .iter()
            .map(|c| self.transformer.references(&c.record))
            .collect();
        let resolved = self.resolve_chunk(pending, &references).await?;

        let mut rows: Vec<Row> = Vec::with_capacity(pending.len());
        let mut links: Vec<Vec<Links>> = Vec::with_capacity(pending.len());
        for ((candidate, refs), resolved) in pending.iter().zip(&references).zip(&resolved) {
            let built = resolved
                .check_required(refs)
                .and_then(|_| self.transformer.build(&candidate.record, resolved));
            match built {
                Ok(transformed) => {
                    rows.push(transformed.row);
                    links.push(transformed.links);
                }
                Err(e) => {
                    warn!(entity = %entity, error = %e, "Dropping record");
                    stats.failed += 1;
                }
            }
        }

        if rows.is_empty() {
            return Ok(stats);
        }
        if self.options.dry_run {
            debug!(entity = %entity, rows = rows.len(), "Dry run: chunk not written");
            stats.migrated += rows.len();
            return Ok(stats);
        }

        let ids = self.store.insert_rows(self.transformer.table(), &rows).await?;
        let pairs: Vec<(String, i64)> = rows
            .iter()
            .zip(&ids)
            .map(|(row, id)| (row.source_id.clone(), *id))
            .collect();
        self.cache.record_batch(&pairs, entity).await?;
        self.write_links(&links, &ids).await?;

        stats.migrated += rows.len();
        Ok(stats)
    }

    /// Resolve every reference of every record concurrently, then confirm
    /// the resolved ids still exist in their target tables.
    async fn resolve_chunk(
        &self,
        pending: &[&Candidate<T::Record>],
        references: &[Vec<Reference>],
    ) -> Result<Vec<Resolved>, StoreError> {
        let cache = self.cache;
        let lookups = references
            .iter()
            .map(|refs| join_all(refs.iter().map(|r| cache.resolve_many(&r.source_ids, r.entity))));
        let lookups: Vec<Vec<Vec<Option<i64>>>> = join_all(lookups).await;

        let mut by_table: BTreeMap<&'static str, HashSet<i64>> = BTreeMap::new();
        for (refs, ids) in references.iter().zip(&lookups) {
            for (reference, ids) in refs.iter().zip(ids) {
                by_table
                    .entry(reference.entity.table())
                    .or_default()
                    .extend(ids.iter().flatten());
            }
        }
        let mut confirmed: HashMap<&'static str, HashSet<i64>> = HashMap::new();
        for (table, ids) in by_table {
            let ids: Vec<i64> = ids.into_iter().collect();
            confirmed.insert(table, self.store.existing_ids(table, &ids).await?);
        }

        let mut out = Vec::with_capacity(pending.len());
        for ((candidate, refs), ids) in pending.iter().zip(references).zip(lookups) {
            let mut resolved = Resolved::new(candidate.source_id.as_str());
            for (reference, ids) in refs.iter().zip(ids) {
                let table = reference.entity.table();
                let target_ids = ids
                    .into_iter()
                    .zip(&reference.source_ids)
                    .map(|(id, source)| {
                        let id = id?;
                        if confirmed.get(table).is_some_and(|set| set.contains(&id)) {
                            Some(id)
                        } else {
                            debug!(
                                source_id = %candidate.source_id,
                                field = reference.field,
                                reference = %source,
                                target_id = id,
                                "Mapped row missing from target table"
                            );
                            None
                        }
                    })
                    .collect();
                resolved.insert(
                    reference.field,
                    ResolvedRef {
                        entity: reference.entity,
                        source_ids: reference.source_ids.clone(),
                        target_ids,
                    },
                );
            }
            out.push(resolved);
        }
        Ok(out)
    }

    async fn write_links(&self, links: &[Vec<Links>], owner_ids: &[i64]) -> Result<(), StoreError> {
        let mut by_junction: BTreeMap<&'static str, (&Links, Vec<(i64, i64)>)> = BTreeMap::new();
        for (record_links, owner) in links.iter().zip(owner_ids) {
            for link in record_links {
                let entry = by_junction
                    .entry(link.junction.table)
                    .or_insert_with(|| (link, Vec::new()));
                entry
                    .1
                    .extend(link.target_ids.iter().map(|target| (*owner, *target)));
            }
        }
        for (table, (link, pairs)) in by_junction {
            let written = self
                .store
                .upsert_links(
                    table,
                    link.junction.owner_column,
                    link.junction.target_column,
                    &pairs,
                )
                .await?;
            debug!(table, pairs = pairs.len(), written, "Junction rows upserted");
        }
        Ok(())
    }
}
