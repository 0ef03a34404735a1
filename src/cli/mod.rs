//! CLI command definitions for sheet-migrator
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod migrate;
pub mod reconcile;

use clap::{Parser, Subcommand};
use migrate::MigrateArgs;
use reconcile::ReconcileArgs;

/// Migrate questionnaire sheets from the source platform into SQLite
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to target database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the migration stages against the source API
    Migrate(MigrateArgs),

    /// Find duplicate sheets and report (or delete) the weaker copies
    Reconcile(ReconcileArgs),

    /// Show row counts of the target database and the last run
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_options_follow_subcommand() {
        let cli = Cli::parse_from(["sheet-migrator", "migrate", "--dry-run", "-v", "--log", "off"]);
        assert!(cli.verbose);
        assert_eq!(cli.log, "off");
        match cli.command {
            Command::Migrate(args) => assert!(args.dry_run),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parent_filter_needs_a_stage() {
        assert!(Cli::try_parse_from(["sheet-migrator", "migrate", "--parent", "c1"]).is_err());
        let cli = Cli::try_parse_from([
            "sheet-migrator", "migrate", "--stage", "sheet", "--parent", "c1",
        ])
        .unwrap();
        match cli.command {
            Command::Migrate(args) => {
                assert_eq!(args.parent.as_deref(), Some("c1"));
                assert_eq!(args.stages, vec!["sheet".to_string()]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn log_defaults_to_stderr() {
        let cli = Cli::parse_from(["sheet-migrator", "status"]);
        assert_eq!(cli.log, "2");
        assert!(matches!(cli.command, Command::Status));
    }
}
