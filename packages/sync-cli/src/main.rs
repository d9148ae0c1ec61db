// Command-line entry point for corpus → graph sync

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use graph_sync::{
    AuditReport, GraphStore, GraphSync, MemoryGraphStore, OutputWriter, OverrideTable,
    RepairReport, RuleSet, SyncError,
};

use crate::config::{Config, StoreSpec};

#[derive(Parser)]
#[command(name = "graph-sync", about = "Sync organization profiles into a property graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON file replacing the default extraction and classifier rules
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Graph store: memory, sqlite:<url> or neo4j (overrides GRAPH_STORE)
    #[arg(long, global = true)]
    store: Option<String>,

    /// Documents and records processed concurrently (overrides SYNC_CONCURRENCY)
    #[arg(long, global = true)]
    concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract records and the corpus summary
    Extract(RunArgs),
    /// Extract, build and upsert into the store
    Load(RunArgs),
    /// Compare the store against the corpus
    Audit(RunArgs),
    /// Audit, repair, then re-audit
    Repair(RunArgs),
    /// Load then repair in one process
    Sync(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Directory of organization profile documents
    #[arg(long)]
    corpus: PathBuf,

    /// Directory for reports
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// JSON override table (display names, orphan reattachment)
    #[arg(long)]
    overrides: Option<PathBuf>,
}

impl Command {
    fn args(&self) -> &RunArgs {
        match self {
            Command::Extract(a)
            | Command::Load(a)
            | Command::Audit(a)
            | Command::Repair(a)
            | Command::Sync(a) => a,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,graph_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(store) = &cli.store {
        config.store = StoreSpec::parse(store)?;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after in-flight records");
            on_signal.cancel();
        }
    });

    let store = connect(&config).await?;
    let args = cli.command.args();

    let rules = match &cli.rules {
        Some(path) => RuleSet::load(path)
            .with_context(|| format!("Failed to load rules from {}", path.display()))?,
        None => RuleSet::default(),
    };
    let overrides = match &args.overrides {
        Some(path) => OverrideTable::load(path)
            .with_context(|| format!("Failed to load overrides from {}", path.display()))?,
        None => OverrideTable::default(),
    };

    let sync = GraphSync::new(store, config.sync_config())
        .with_rules(rules)
        .with_overrides(overrides)
        .with_cancellation(cancel.clone());

    let clean = run(&sync, &cli.command).await?;
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled.into());
    }
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn connect(config: &Config) -> Result<Arc<dyn GraphStore>> {
    tracing::info!(store = ?config.store, "Connecting to graph store...");
    let store: Arc<dyn GraphStore> = match &config.store {
        StoreSpec::Memory => Arc::new(MemoryGraphStore::new()),
        StoreSpec::Sqlite(url) => sqlite(url).await?,
        StoreSpec::Neo4j => neo4j(config).await?,
    };
    Ok(store)
}

#[cfg(feature = "sqlite")]
async fn sqlite(url: &str) -> Result<Arc<dyn GraphStore>> {
    let store = graph_sync::SqliteGraphStore::new(url)
        .await
        .context("Failed to open SQLite store")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn sqlite(_url: &str) -> Result<Arc<dyn GraphStore>> {
    anyhow::bail!("built without the `sqlite` feature")
}

#[cfg(feature = "neo4j")]
async fn neo4j(config: &Config) -> Result<Arc<dyn GraphStore>> {
    let password = config
        .neo4j_password
        .as_deref()
        .context("NEO4J_PASSWORD must be set")?;
    let store =
        graph_sync::Neo4jGraphStore::connect(&config.neo4j_uri, &config.neo4j_user, password)
            .await
            .context("Failed to connect to Neo4j")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "neo4j"))]
async fn neo4j(_config: &Config) -> Result<Arc<dyn GraphStore>> {
    anyhow::bail!("built without the `neo4j` feature")
}

/// Run one subcommand. Returns whether everything succeeded.
async fn run(sync: &GraphSync<Arc<dyn GraphStore>>, command: &Command) -> Result<bool> {
    let args = command.args();
    let output = OutputWriter::new(&args.output);

    let extraction = sync
        .extract_corpus(&args.corpus)
        .await
        .with_context(|| format!("Failed to read corpus {}", args.corpus.display()))?;
    let expected = sync.expected_graph(&extraction);

    output.write_records(&extraction.records)?;
    let summary = sync.summarize(&extraction, &expected);
    output.write_summary(&summary)?;
    println!(
        "{} {} documents, {} failed, {} entities, {} relationships",
        "Extracted".bright_green().bold(),
        summary.documents_processed,
        summary.documents_failed,
        expected.graph.entities.len(),
        expected.graph.relationships.len(),
    );
    let mut clean = summary.documents_failed == 0 && expected.skipped.is_empty();

    if matches!(command, Command::Extract(_)) {
        return Ok(clean);
    }

    if matches!(command, Command::Load(_) | Command::Sync(_)) {
        let load = sync.load(&extraction, &expected).await?;
        output.write_load_report(&load)?;
        println!(
            "{} {} created, {} updated, {} unchanged, {} failed, {} skipped",
            "Loaded".bright_green().bold(),
            load.upsert.created,
            load.upsert.updated,
            load.upsert.unchanged,
            load.upsert.failed,
            load.skipped.len(),
        );
        clean &= load.upsert.failed == 0 && load.skipped.is_empty() && !load.cancelled;
    }

    if matches!(command, Command::Load(_)) {
        return Ok(clean);
    }

    let audit = sync.audit(&expected).await?;
    output.write_audit_report(&audit)?;
    print_audit(&audit);

    if matches!(command, Command::Audit(_)) {
        return Ok(clean && audit.is_clean());
    }

    let repair = sync.repair(&audit, &expected).await?;
    let (_, markdown) = output.write_repair_report(&repair)?;
    print_repair(&repair);
    println!("Summary written to {}", markdown.display());

    Ok(clean && repair.after.is_closed())
}

fn print_audit(audit: &AuditReport) {
    let c = &audit.counts;
    let status = if audit.is_clean() {
        "Audit clean".bright_green().bold()
    } else {
        "Audit found".bright_yellow().bold()
    };
    println!(
        "{status} {} missing entities, {} missing relationships, {} orphans, {} duplicates, {} programs with several units",
        c.missing_entity,
        c.missing_relationship,
        c.orphaned_entity,
        c.duplicate_relationship,
        c.multiple_parents,
    );
}

fn print_repair(repair: &RepairReport) {
    use graph_sync::ActionStatus;

    let status = if repair.after.is_closed() {
        "Repaired".bright_green().bold()
    } else {
        "Repair incomplete".bright_red().bold()
    };
    println!(
        "{status} {} applied, {} flagged, {} failed; {} discrepancies remain",
        repair.count(ActionStatus::Applied),
        repair.count(ActionStatus::Flagged),
        repair.count(ActionStatus::Failed),
        repair.after.counts.total(),
    );
}
