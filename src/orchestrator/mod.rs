//! Stage sequencing.
//!
//! A [`Plan`] is an explicit, ordered list of [`StageDescriptor`]s. The
//! plan is validated before anything runs: every stage may only depend on
//! entities produced by an earlier stage. Stages run strictly one after
//! another since each one needs the mappings the previous ones recorded.

mod lineage;

pub use lineage::{LineageStage, closes_cycle};

use crate::error::MigrationError;
use crate::identity::IdentityCache;
use crate::pipeline::{BatchImporter, ImportOptions};
use crate::source::{SourceApi, fetch_all};
use crate::store::TargetStore;
use crate::transform::{
    AnswerTransformer, AssociationTransformer, ChemicalTransformer, ChoiceTransformer,
    CompanyTransformer, ListTableColumnTransformer, ListTableRowTransformer,
    ListTableTransformer, QuestionTransformer, SectionTransformer, SheetTransformer,
    StackTransformer, SubsectionTransformer, TagTransformer, Transformer, UserTransformer,
};
use crate::types::{EntityType, MigrationReport, StageReport, StageStats};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared handles every stage runs against.
pub struct StageContext {
    pub store: Arc<dyn TargetStore>,
    pub cache: Arc<IdentityCache>,
    pub options: ImportOptions,
}

/// The work of one stage, given its candidate records.
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Source type name the candidates are fetched from.
    fn source_type(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &StageContext,
        records: Vec<Value>,
    ) -> Result<StageStats, MigrationError>;
}

/// Runs a transformer through the batch importer.
pub struct ImportStage<T>(pub T);

#[async_trait]
impl<T> StageRunner for ImportStage<T>
where
    T: Transformer + 'static,
{
    fn source_type(&self) -> &'static str {
        self.0.entity().source_type()
    }

    async fn run(
        &self,
        ctx: &StageContext,
        records: Vec<Value>,
    ) -> Result<StageStats, MigrationError> {
        BatchImporter::new(&self.0, ctx.store.as_ref(), &ctx.cache, &ctx.options)
            .run(records)
            .await
    }
}

pub struct StageDescriptor {
    pub name: &'static str,
    pub entity: EntityType,
    pub depends_on: Vec<EntityType>,
    pub runner: Box<dyn StageRunner>,
}

impl StageDescriptor {
    /// Import stage named after the transformer's entity.
    pub fn import<T: Transformer + 'static>(transformer: T) -> Self {
        let entity = transformer.entity();
        Self {
            name: entity.as_str(),
            entity,
            depends_on: transformer.depends_on().to_vec(),
            runner: Box::new(ImportStage(transformer)),
        }
    }
}

pub struct Plan {
    stages: Vec<StageDescriptor>,
}

impl Default for Plan {
    /// Every entity in foreign-key order, then the sheet lineage pass.
    fn default() -> Self {
        Self::new(vec![
            StageDescriptor::import(AssociationTransformer),
            StageDescriptor::import(StackTransformer),
            StageDescriptor::import(CompanyTransformer),
            StageDescriptor::import(UserTransformer),
            StageDescriptor::import(TagTransformer),
            StageDescriptor::import(SectionTransformer),
            StageDescriptor::import(SubsectionTransformer),
            StageDescriptor::import(QuestionTransformer),
            StageDescriptor::import(ChoiceTransformer),
            StageDescriptor::import(ListTableTransformer),
            StageDescriptor::import(ListTableColumnTransformer),
            StageDescriptor::import(ListTableRowTransformer),
            StageDescriptor::import(SheetTransformer),
            StageDescriptor::import(ChemicalTransformer),
            StageDescriptor::import(AnswerTransformer),
            LineageStage::descriptor(),
        ])
    }
}

impl Plan {
    pub fn new(stages: Vec<StageDescriptor>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name).collect()
    }

    /// Every dependency must be produced by an earlier stage, and stage
    /// names must be unique.
    pub fn validate(&self) -> Result<(), MigrationError> {
        let mut names = HashSet::new();
        let mut produced = HashSet::new();
        for stage in &self.stages {
            if !names.insert(stage.name) {
                return Err(MigrationError::InvalidPlan(format!(
                    "stage {} appears twice",
                    stage.name
                )));
            }
            for dep in &stage.depends_on {
                if !produced.contains(dep) {
                    return Err(MigrationError::InvalidPlan(format!(
                        "stage {} depends on {} which no earlier stage produces",
                        stage.name, dep
                    )));
                }
            }
            produced.insert(stage.entity);
        }
        Ok(())
    }

    /// Stages to run, in plan order. An empty selection means all of them.
    pub fn select(&self, names: &[String]) -> Result<Vec<&StageDescriptor>, MigrationError> {
        if let Some(unknown) = names
            .iter()
            .find(|n| !self.stages.iter().any(|s| s.name == n.as_str()))
        {
            return Err(MigrationError::InvalidPlan(format!(
                "unknown stage {} (known: {})",
                unknown,
                self.stage_names().join(", ")
            )));
        }
        Ok(self
            .stages
            .iter()
            .filter(|s| names.is_empty() || names.iter().any(|n| n == s.name))
            .collect())
    }
}

/// Settings of one orchestrated run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub import: ImportOptions,
    pub page_size: usize,
    /// Stage names to run; empty runs the whole plan.
    pub stages: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            import: ImportOptions::default(),
            page_size: 100,
            stages: Vec::new(),
        }
    }
}

pub struct Orchestrator {
    plan: Plan,
    source: Arc<dyn SourceApi>,
    ctx: StageContext,
    page_size: usize,
    selection: Vec<String>,
}

impl Orchestrator {
    /// Build an orchestrator. Fails if the plan is invalid.
    pub fn new(
        plan: Plan,
        source: Arc<dyn SourceApi>,
        store: Arc<dyn TargetStore>,
        cache: Arc<IdentityCache>,
        options: RunOptions,
    ) -> Result<Self, MigrationError> {
        plan.validate()?;
        plan.select(&options.stages)?;
        // Each stage filters on its own direct parent, so a parent id only
        // means something for an explicit stage selection.
        if options.import.parent.is_some() && options.stages.is_empty() {
            return Err(MigrationError::InvalidPlan(
                "a parent filter requires an explicit stage selection".into(),
            ));
        }
        Ok(Self {
            plan,
            source,
            ctx: StageContext {
                store,
                cache,
                options: options.import,
            },
            page_size: options.page_size.max(1),
            selection: options.stages,
        })
    }

    /// Run the selected stages in order. Only fatal errors abort; record
    /// and chunk failures are reported in the stage statistics.
    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        let started_at = Utc::now();
        let selected = self.plan.select(&self.selection)?;
        let options = &self.ctx.options;
        info!(
            stages = selected.len(),
            dry_run = options.dry_run,
            limit = options.limit,
            parent = options.parent.as_deref(),
            "Starting migration"
        );

        let mut reports = Vec::with_capacity(selected.len());
        for stage in selected {
            let started = Instant::now();
            self.preload(stage).await;

            // With a parent filter the owned records can be anywhere in the
            // source listing, so the limit is applied after filtering.
            let fetch_max = match options.parent {
                Some(_) => None,
                None => options.limit,
            };
            let records = fetch_all(
                self.source.as_ref(),
                stage.runner.source_type(),
                self.page_size,
                fetch_max,
                &options.retry,
            )
            .await
            .map_err(|source| MigrationError::Source {
                stage: stage.name.to_string(),
                source,
            })?;
            info!(stage = stage.name, candidates = records.len(), "Fetched candidates");

            let stats = stage.runner.run(&self.ctx, records).await?;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            info!(
                stage = stage.name,
                migrated = stats.migrated,
                skipped = stats.skipped,
                failed = stats.failed,
                elapsed_ms,
                "Stage complete"
            );
            reports.push(StageReport {
                name: stage.name.to_string(),
                stats,
                elapsed_ms,
            });
        }

        let report = MigrationReport {
            dry_run: options.dry_run,
            started_at,
            finished_at: Utc::now(),
            stages: reports,
        };
        let totals = report.totals();
        if totals.failed > 0 {
            warn!(
                failed = totals.failed,
                migrated = totals.migrated,
                "Migration finished with failures"
            );
        } else {
            info!(
                migrated = totals.migrated,
                skipped = totals.skipped,
                "Migration finished"
            );
        }
        Ok(report)
    }

    /// Warm the cache for the stage entity and its dependencies. A failed
    /// preload only costs speed: lookups fall back to the store.
    async fn preload(&self, stage: &StageDescriptor) {
        let entities = std::iter::once(stage.entity).chain(stage.depends_on.iter().copied());
        for entity in entities {
            if self.ctx.cache.is_preloaded(entity).await {
                continue;
            }
            if let Err(e) = self.ctx.cache.preload(entity).await {
                warn!(stage = stage.name, entity = %entity, error = %e, "Preload failed");
            }
        }
    }
}
