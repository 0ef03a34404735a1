//! Core types shared by every stage of the migration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Every entity type the migrator knows about.
///
/// The order of the variants is the default stage order: an entity only
/// ever references variants declared before it (sheets referencing other
/// sheets are handled by the lineage pass).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Association,
    Stack,
    Company,
    User,
    Tag,
    Section,
    Subsection,
    Question,
    Choice,
    ListTable,
    ListTableColumn,
    ListTableRow,
    Sheet,
    Chemical,
    Answer,
}

impl EntityType {
    pub const ALL: [EntityType; 15] = [
        EntityType::Association,
        EntityType::Stack,
        EntityType::Company,
        EntityType::User,
        EntityType::Tag,
        EntityType::Section,
        EntityType::Subsection,
        EntityType::Question,
        EntityType::Choice,
        EntityType::ListTable,
        EntityType::ListTableColumn,
        EntityType::ListTableRow,
        EntityType::Sheet,
        EntityType::Chemical,
        EntityType::Answer,
    ];

    /// Name stored in the `entity_type` column of the mapping table.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Association => "association",
            EntityType::Stack => "stack",
            EntityType::Company => "company",
            EntityType::User => "user",
            EntityType::Tag => "tag",
            EntityType::Section => "section",
            EntityType::Subsection => "subsection",
            EntityType::Question => "question",
            EntityType::Choice => "choice",
            EntityType::ListTable => "list_table",
            EntityType::ListTableColumn => "list_table_column",
            EntityType::ListTableRow => "list_table_row",
            EntityType::Sheet => "sheet",
            EntityType::Chemical => "chemical",
            EntityType::Answer => "answer",
        }
    }

    /// Target table holding rows of this entity.
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Association => "associations",
            EntityType::Stack => "stacks",
            EntityType::Company => "companies",
            EntityType::User => "users",
            EntityType::Tag => "tags",
            EntityType::Section => "sections",
            EntityType::Subsection => "subsections",
            EntityType::Question => "questions",
            EntityType::Choice => "choices",
            EntityType::ListTable => "list_tables",
            EntityType::ListTableColumn => "list_table_columns",
            EntityType::ListTableRow => "list_table_rows",
            EntityType::Sheet => "sheets",
            EntityType::Chemical => "chemicals",
            EntityType::Answer => "answers",
        }
    }

    /// Type name of the source platform endpoint.
    pub fn source_type(&self) -> &'static str {
        match self {
            EntityType::ListTable => "listtable",
            EntityType::ListTableColumn => "listtablecolumn",
            EntityType::ListTableRow => "listtablerow",
            other => other.as_str(),
        }
    }

    /// Parse a mapping-table name back into an entity type.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.as_str() == s)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column value headed for the target store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Real(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Text(v.to_rfc3339())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// A normalized row ready for insertion.
///
/// Columns that are absent are left unset in the INSERT, so the store
/// applies its own default (NULL for every foreign key).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub source_id: String,
    pub columns: Vec<(&'static str, FieldValue)>,
}

impl Row {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            columns: Vec::new(),
        }
    }

    /// Set a column; `Null` values are dropped so the column stays unset.
    pub fn set(mut self, column: &'static str, value: impl Into<FieldValue>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.columns.push((column, value));
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, v)| v)
    }
}

/// Per-stage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StageStats {
    pub fn total(&self) -> usize {
        self.migrated + self.skipped + self.failed
    }

    pub fn absorb(&mut self, other: StageStats) {
        self.migrated += other.migrated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Result of one stage, as reported by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub stats: StageStats,
    pub elapsed_ms: u64,
}

/// Aggregate report over a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

impl MigrationReport {
    pub fn totals(&self) -> StageStats {
        let mut totals = StageStats::default();
        for stage in &self.stages {
            totals.absorb(stage.stats);
        }
        totals
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Render the per-stage table printed at the end of a run.
    pub fn to_table(&self) -> String {
        let mut out = String::new();
        let title = if self.dry_run {
            "Migration summary (dry run)"
        } else {
            "Migration summary"
        };
        out.push_str(title);
        out.push('\n');
        out.push_str(&format!(
            "  {:<20} {:>10} {:>10} {:>10} {:>10}\n",
            "stage", "migrated", "skipped", "failed", "ms"
        ));
        for stage in &self.stages {
            out.push_str(&format!(
                "  {:<20} {:>10} {:>10} {:>10} {:>10}\n",
                stage.name,
                stage.stats.migrated,
                stage.stats.skipped,
                stage.stats.failed,
                stage.elapsed_ms
            ));
        }
        let totals = self.totals();
        out.push_str(&format!(
            "  {:<20} {:>10} {:>10} {:>10}\n",
            "total", totals.migrated, totals.skipped, totals.failed
        ));
        out
    }
}

/// Row counts per table, used by `status` and by dry-run checks.
pub type TableCounts = BTreeMap<String, usize>;
