//! Configuration types and structures.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Legacy platform API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the data API, e.g. `https://app.example.com/api/1.1`.
    #[serde(default)]
    pub base_url: String,

    /// Bearer token. Usually supplied through `SHEET_MIGRATOR_SOURCE_TOKEN`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Records requested per page (the platform caps this at 100).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_page_size() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

/// Target store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("sheet-migrator/target.db")
}

/// Batch import settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Rows per insert chunk.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retries for a chunk that hit a transient error.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between chunk retries, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Log progress every N processed records.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Never write; compute and log only.
    #[serde(default)]
    pub dry_run: bool,

    /// Cap on records processed per stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            progress_interval: default_progress_interval(),
            dry_run: false,
            limit: None,
        }
    }
}

impl ImportConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_progress_interval() -> usize {
    100
}

/// Weights for the duplicate reconciliation scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Points per workflow status. Statuses not listed score zero.
    #[serde(default = "default_status_scores")]
    pub status_scores: BTreeMap<String, f64>,

    /// Bonus when the sheet has chemical records attached.
    #[serde(default = "default_chemical_bonus")]
    pub chemical_bonus: f64,

    /// Points per attached answer.
    #[serde(default = "default_answer_weight")]
    pub answer_weight: f64,

    /// Answers beyond this count add nothing.
    #[serde(default = "default_answer_cap")]
    pub answer_cap: usize,

    /// Bonus for a sheet modified right now; decays linearly to zero.
    #[serde(default = "default_recency_max")]
    pub recency_max: f64,

    /// Age in days at which the recency bonus reaches zero.
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            status_scores: default_status_scores(),
            chemical_bonus: default_chemical_bonus(),
            answer_weight: default_answer_weight(),
            answer_cap: default_answer_cap(),
            recency_max: default_recency_max(),
            recency_window_days: default_recency_window_days(),
        }
    }
}

impl ReconcileConfig {
    /// Status points for a raw status string (case-insensitive).
    pub fn status_points(&self, status: Option<&str>) -> f64 {
        let Some(status) = status else {
            return 0.0;
        };
        let key = status.trim().to_lowercase().replace([' ', '-'], "_");
        self.status_scores.get(&key).copied().unwrap_or(0.0)
    }
}

fn default_status_scores() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("approved".to_string(), 1000.0),
        ("reviewed".to_string(), 800.0),
        ("in_review".to_string(), 800.0),
        ("submitted".to_string(), 500.0),
        ("in_progress".to_string(), 250.0),
    ])
}

fn default_chemical_bonus() -> f64 {
    500.0
}

fn default_answer_weight() -> f64 {
    1.0
}

fn default_answer_cap() -> usize {
    200
}

fn default_recency_max() -> f64 {
    50.0
}

fn default_recency_window_days() -> f64 {
    365.0
}

impl Config {
    /// Load configuration from a single YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.import.batch_size == 0 {
            return Err(anyhow!("import.batch_size must be at least 1"));
        }
        if self.source.page_size == 0 {
            return Err(anyhow!("source.page_size must be at least 1"));
        }
        if self.reconcile.recency_window_days <= 0.0 {
            return Err(anyhow!("reconcile.recency_window_days must be positive"));
        }
        Ok(())
    }

    /// Ensure the database parent directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.target.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.import.batch_size, 50);
        assert_eq!(config.import.max_retries, 3);
        assert_eq!(config.source.page_size, 100);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = Config::default();
        config.import.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn status_points_normalize_case_and_spacing() {
        let reconcile = ReconcileConfig::default();
        assert_eq!(reconcile.status_points(Some("Approved")), 1000.0);
        assert_eq!(reconcile.status_points(Some("In Review")), 800.0);
        assert_eq!(reconcile.status_points(Some("rejected")), 0.0);
        assert_eq!(reconcile.status_points(None), 0.0);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
import:
  batch_size: 80
reconcile:
  chemical_bonus: 250
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.import.batch_size, 80);
        assert_eq!(config.import.max_retries, 3);
        assert_eq!(config.reconcile.chemical_bonus, 250.0);
        assert_eq!(config.reconcile.answer_cap, 200);
    }
}
