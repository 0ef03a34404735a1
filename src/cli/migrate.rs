//! Migrate subcommand.
//!
//! Flags here override the `import` section of the loaded configuration
//! for a single run.

use crate::config::Config;
use crate::orchestrator::RunOptions;
use crate::pipeline::ImportOptions;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the migrate subcommand
#[derive(Args, Debug, Default)]
pub struct MigrateArgs {
    /// Report what would be migrated without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Process at most this many records per stage
    #[arg(long)]
    pub limit: Option<usize>,

    /// Only migrate records whose direct parent has this source id
    /// (company for sheets, sheet for answers); requires --stage
    #[arg(long, value_name = "SOURCE_ID", requires = "stages")]
    pub parent: Option<String>,

    /// Run only the named stage (repeatable); stages still run in plan order
    #[arg(long = "stage", value_name = "NAME")]
    pub stages: Vec<String>,

    /// Rows per insert transaction (overrides config)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Read records from `<type>.json` files in this directory instead of the API
    #[arg(long, value_name = "DIR")]
    pub from_dump: Option<PathBuf>,
}

impl MigrateArgs {
    /// Apply the flags on top of the configured import settings.
    pub fn apply(&self, config: &mut Config) {
        if self.dry_run {
            config.import.dry_run = true;
        }
        if let Some(limit) = self.limit {
            config.import.limit = Some(limit);
        }
        if let Some(batch_size) = self.batch_size {
            config.import.batch_size = batch_size;
        }
    }

    /// Orchestrator settings for this run.
    pub fn run_options(&self, config: &Config) -> RunOptions {
        let mut import = ImportOptions::from(&config.import);
        import.parent = self.parent.clone();
        RunOptions {
            import,
            page_size: config.source.page_size,
            stages: self.stages.clone(),
        }
    }

    /// Describe the run mode for logging
    pub fn mode(&self) -> &'static str {
        match (self.dry_run, self.from_dump.is_some()) {
            (true, true) => "dry-run-from-dump",
            (true, false) => "dry-run",
            (false, true) => "from-dump",
            (false, false) => "live",
        }
    }
}
