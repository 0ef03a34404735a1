//! Sheet Migrator
//!
//! Moves companies, questionnaires and sheets from the legacy platform API
//! into the normalized target schema, and reconciles duplicate sheets.

use anyhow::Result;
use clap::Parser;
use sheet_migrator::cli::migrate::MigrateArgs;
use sheet_migrator::cli::reconcile::{ReconcileArgs, ReportFormat};
use sheet_migrator::cli::{Cli, Command};
use sheet_migrator::config::{Config, ConfigLoader};
use sheet_migrator::db::Database;
use sheet_migrator::identity::IdentityCache;
use sheet_migrator::logging;
use sheet_migrator::orchestrator::{Orchestrator, Plan};
use sheet_migrator::reconcile;
use sheet_migrator::source::{HttpSource, SourceApi, StaticSource};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log, cli.verbose)?;

    // If explicit config path given, set it as env var for ConfigLoader to pick up
    // SAFETY: This is safe at program startup before any other threads are spawned
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("SHEET_MIGRATOR_CONFIG_PATH", config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;
    if let Some(path) = loader.config_path() {
        info!(path = %path.display(), "Loaded configuration");
    }

    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.target.db_path = db_path.into();
    }
    if let Command::Migrate(args) = &cli.command {
        args.apply(config);
    }
    let config = loader.into_config();
    config.validate()?;
    config.ensure_db_dir()?;

    let db = Arc::new(Database::open(&config.target.db_path)?);

    match cli.command {
        Command::Migrate(args) => run_migrate(&config, db, args).await?,
        Command::Reconcile(args) => run_reconcile(&config, &db, args)?,
        Command::Status => run_status(db).await?,
    }

    Ok(())
}

async fn run_migrate(config: &Config, db: Arc<Database>, args: MigrateArgs) -> Result<()> {
    let source: Arc<dyn SourceApi> = match &args.from_dump {
        Some(dir) => Arc::new(StaticSource::from_dir(dir)?),
        None => Arc::new(HttpSource::new(&config.source)?),
    };
    info!(
        mode = args.mode(),
        db = %config.target.db_path.display(),
        "Starting migrate"
    );

    let cache = Arc::new(IdentityCache::new(db.clone()));
    let options = args.run_options(config);
    let dry_run = options.import.dry_run;
    let orchestrator = Orchestrator::new(Plan::default(), source, db.clone(), cache, options)?;
    let report = orchestrator.run().await?;

    print!("{}", report.to_table());
    if !dry_run {
        let run_id = db.record_run(&report)?;
        info!(run_id, "Recorded migration run");
    }
    Ok(())
}

fn run_reconcile(config: &Config, db: &Database, args: ReconcileArgs) -> Result<()> {
    let delete = args.should_delete()?;
    let sheets = db.sheet_candidates(args.company)?;
    let plan = reconcile::resolve(sheets, &config.reconcile, args.reference_time());

    match args.format {
        ReportFormat::Text => print!("{}", plan.to_text()),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }

    let ids = plan.delete_ids();
    if !delete {
        if !ids.is_empty() {
            eprintln!(
                "{} sheets would be deleted; rerun with --apply --yes to delete them",
                ids.len()
            );
        }
        return Ok(());
    }
    if ids.is_empty() {
        info!("No duplicate sheets to delete");
        return Ok(());
    }

    let summary = db.delete_sheets(&ids)?;
    warn!(
        sheets = summary.sheets,
        answers = summary.answers,
        chemicals = summary.chemicals,
        links = summary.links,
        detached = summary.detached,
        "Deleted duplicate sheets"
    );
    eprintln!(
        "Deleted {} sheets ({} answers, {} chemicals)",
        summary.sheets, summary.answers, summary.chemicals
    );
    Ok(())
}

async fn run_status(db: Arc<Database>) -> Result<()> {
    println!("Table rows:");
    for (table, count) in db.table_counts()? {
        println!("  {:<28} {:>10}", table, count);
    }

    println!("Mappings:");
    let cache = IdentityCache::new(db.clone());
    for (entity, count) in cache.stats().await? {
        println!("  {:<28} {:>10}", entity.as_str(), count);
    }

    match db.last_run()? {
        Some(report) => {
            let totals = report.totals();
            println!(
                "Last run: {} (migrated {}, skipped {}, failed {})",
                report.finished_at.to_rfc3339(),
                totals.migrated,
                totals.skipped,
                totals.failed
            );
        }
        None => println!("Last run: none"),
    }
    Ok(())
}
