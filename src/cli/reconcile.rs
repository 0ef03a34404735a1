//! Reconcile subcommand.
//!
//! Without `--apply` the command only reports. Deleting requires both
//! `--apply` and `--yes`.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Arguments for the reconcile subcommand
#[derive(Args, Debug, Default)]
pub struct ReconcileArgs {
    /// Only examine sheets of this target company id
    #[arg(long)]
    pub company: Option<i64>,

    /// Delete the delete candidates after reporting them
    #[arg(long)]
    pub apply: bool,

    /// Confirm deletion (required with --apply)
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    /// Score recency against this RFC 3339 time instead of now
    #[arg(long, value_name = "TIME")]
    pub as_of: Option<DateTime<Utc>>,
}

impl ReconcileArgs {
    /// Whether deletion should go ahead. `--apply` without `--yes` is an error.
    pub fn should_delete(&self) -> Result<bool> {
        match (self.apply, self.yes) {
            (true, true) => Ok(true),
            (true, false) => bail!("--apply deletes sheets; pass --yes to confirm"),
            (false, _) => Ok(false),
        }
    }

    /// The instant recency is measured from.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.as_of.unwrap_or_else(Utc::now)
    }
}
