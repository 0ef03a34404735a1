//! Sheet lineage: the second pass over sheets.
//!
//! Father and previous sheet links point at other sheets, which may not
//! have existed while the sheet stage ran. This pass runs once every sheet
//! has an id and only ever links ids that are confirmed in the target
//! table.
//!
//! Each link kind forms a graph with at most one outgoing edge per sheet,
//! seeded from the links already stored. Links are applied in ascending
//! source-id order; a link to the sheet itself or one that would close a
//! cycle within its kind is refused and counted as skipped, as is a link
//! whose target never migrated or that is already stored.

use super::{StageContext, StageDescriptor, StageRunner};
use crate::error::MigrationError;
use crate::source::records::SheetRecord;
use crate::types::{EntityType, FieldValue, StageStats};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LinkKind {
    Father,
    Previous,
}

impl LinkKind {
    fn column(self) -> &'static str {
        match self {
            LinkKind::Father => "father_sheet_id",
            LinkKind::Previous => "previous_sheet_id",
        }
    }
}

struct Link {
    kind: LinkKind,
    sheet: String,
    target: String,
}

/// True when adding `from -> to` to `graph` would create a cycle (or a
/// self-link). `graph` maps each sheet to the one it points at.
pub fn closes_cycle(graph: &HashMap<i64, i64>, from: i64, to: i64) -> bool {
    let mut current = to;
    for _ in 0..=graph.len() {
        if current == from {
            return true;
        }
        match graph.get(&current) {
            Some(next) => current = *next,
            None => return false,
        }
    }
    // More steps than edges: the walk is already going round a cycle.
    true
}

pub struct LineageStage;

impl LineageStage {
    pub const NAME: &'static str = "sheet_lineage";

    pub fn descriptor() -> StageDescriptor {
        StageDescriptor {
            name: Self::NAME,
            entity: EntityType::Sheet,
            depends_on: vec![EntityType::Sheet],
            runner: Box::new(LineageStage),
        }
    }

    fn collect_links(ctx: &StageContext, records: Vec<Value>, stats: &mut StageStats) -> Vec<Link> {
        let options = &ctx.options;
        let mut sheets: Vec<SheetRecord> = Vec::new();
        for value in records {
            if let Some(limit) = options.limit
                && sheets.len() >= limit
            {
                break;
            }
            match serde_json::from_value::<SheetRecord>(value) {
                Ok(record) if record.id.is_some() => {
                    if let Some(parent) = options.parent.as_deref()
                        && record.company.as_deref() != Some(parent)
                    {
                        continue;
                    }
                    sheets.push(record);
                }
                Ok(_) => stats.failed += 1,
                Err(e) => {
                    warn!(error = %e, "Undecodable sheet record in lineage pass");
                    stats.failed += 1;
                }
            }
        }
        sheets.sort_by(|a, b| a.id.cmp(&b.id));

        let mut links = Vec::new();
        for sheet in sheets {
            let Some(id) = sheet.id else { continue };
            if let Some(target) = sheet.father_sheet {
                links.push(Link {
                    kind: LinkKind::Father,
                    sheet: id.clone(),
                    target,
                });
            }
            if let Some(target) = sheet.previous_sheet {
                links.push(Link {
                    kind: LinkKind::Previous,
                    sheet: id,
                    target,
                });
            }
        }
        links
    }
}

#[async_trait]
impl StageRunner for LineageStage {
    fn source_type(&self) -> &'static str {
        EntityType::Sheet.source_type()
    }

    async fn run(
        &self,
        ctx: &StageContext,
        records: Vec<Value>,
    ) -> Result<StageStats, MigrationError> {
        let mut stats = StageStats::default();
        let links = Self::collect_links(ctx, records, &mut stats);
        if links.is_empty() {
            return Ok(stats);
        }

        let source_ids: Vec<String> = links
            .iter()
            .flat_map(|l| [l.sheet.clone(), l.target.clone()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let resolved = ctx.cache.resolve_many(&source_ids, EntityType::Sheet).await;
        let ids: Vec<i64> = resolved.iter().flatten().copied().collect();
        let table = EntityType::Sheet.table();
        let existing: HashSet<i64> = match ctx
            .options
            .retry
            .run("sheet lineage lookup", || ctx.store.existing_ids(table, &ids))
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                warn!(links = links.len(), error = %e, "Cannot confirm sheets; lineage pass failed");
                stats.failed += links.len();
                return Ok(stats);
            }
        };
        let target_of: HashMap<&str, i64> = source_ids
            .iter()
            .zip(resolved)
            .filter_map(|(src, id)| id.filter(|id| existing.contains(id)).map(|id| (src.as_str(), id)))
            .collect();

        // Start from the links already stored so a scoped run cannot close a
        // cycle through sheets it did not read.
        let mut graphs: HashMap<LinkKind, HashMap<i64, i64>> = HashMap::new();
        for kind in [LinkKind::Father, LinkKind::Previous] {
            match ctx
                .options
                .retry
                .run("sheet lineage graph", || ctx.store.column_values(table, kind.column()))
                .await
            {
                Ok(graph) => {
                    graphs.insert(kind, graph);
                }
                Err(e) => {
                    warn!(links = links.len(), error = %e, "Cannot read stored lineage; lineage pass failed");
                    stats.failed += links.len();
                    return Ok(stats);
                }
            }
        }

        let mut linked: HashSet<(LinkKind, i64)> = HashSet::new();
        let mut updates: BTreeMap<i64, Vec<(&'static str, FieldValue)>> = BTreeMap::new();
        for link in &links {
            let (Some(&from), Some(&to)) = (
                target_of.get(link.sheet.as_str()),
                target_of.get(link.target.as_str()),
            ) else {
                debug!(
                    sheet = %link.sheet,
                    target = %link.target,
                    column = link.kind.column(),
                    "Lineage link unresolved"
                );
                stats.skipped += 1;
                continue;
            };
            if !linked.insert((link.kind, from)) {
                stats.skipped += 1;
                continue;
            }
            let graph = graphs.entry(link.kind).or_default();
            if graph.get(&from) == Some(&to) {
                debug!(sheet = %link.sheet, column = link.kind.column(), "Lineage link unchanged");
                stats.skipped += 1;
                continue;
            }
            let stored = graph.remove(&from);
            if closes_cycle(graph, from, to) {
                if let Some(stored) = stored {
                    graph.insert(from, stored);
                }
                warn!(
                    sheet = %link.sheet,
                    target = %link.target,
                    column = link.kind.column(),
                    "Refusing lineage link that would form a cycle"
                );
                stats.skipped += 1;
                continue;
            }
            graph.insert(from, to);
            updates
                .entry(from)
                .or_default()
                .push((link.kind.column(), FieldValue::Integer(to)));
        }

        let applied: usize = updates.values().map(Vec::len).sum();
        if ctx.options.dry_run {
            stats.migrated += applied;
            info!(links = applied, "Dry run: lineage links not written");
            return Ok(stats);
        }

        for (sheet_id, columns) in &updates {
            let result = ctx
                .options
                .retry
                .run("sheet lineage update", || {
                    ctx.store.update_columns(table, *sheet_id, columns)
                })
                .await;
            match result {
                Ok(()) => stats.migrated += columns.len(),
                Err(e) => {
                    warn!(sheet_id, error = %e, "Lineage update failed");
                    stats.failed += columns.len();
                }
            }
        }
        Ok(stats)
    }
}
