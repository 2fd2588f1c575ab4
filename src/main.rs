use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use orgsync::{
    InMemoryStore, OrganizationTree, ReconcileConfig, Reconciler, RowId, SnapshotFile,
    TransactionMode,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "orgsync")]
#[command(about = "Reconcile organization trees against a JSON-backed store")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Args)]
struct Tuning {
    /// best-effort, atomic or auto
    #[arg(long, global = true)]
    transaction_mode: Option<TransactionMode>,
    #[arg(long, global = true)]
    fan_out: Option<usize>,
    /// Per-call store deadline in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile a tree read from a JSON file
    Save {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        input: PathBuf,
    },
    /// Delete a company and everything under it
    Delete {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        company: String,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Print row counts per collection
    Show {
        #[arg(long)]
        store: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = build_config(&cli.tuning)?;

    match cli.command {
        Command::Save { store, input } => save(&store, &input, config).await,
        Command::Delete { store, company, owner } => delete(&store, &company, owner.as_deref(), config).await,
        Command::Show { store } => show(&store).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("orgsync=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_config(tuning: &Tuning) -> Result<ReconcileConfig> {
    let mut config = ReconcileConfig::from_env().map_err(|e| anyhow!(e))?;
    if let Some(mode) = tuning.transaction_mode {
        config = config.transaction_mode(mode);
    }
    if let Some(fan_out) = tuning.fan_out {
        config = config.fan_out(fan_out);
    }
    if let Some(ms) = tuning.timeout_ms {
        config = config.store_timeout(Duration::from_millis(ms));
    }
    config.validate().map_err(|e| anyhow!(e))?;
    Ok(config)
}

fn open_store(path: &Path) -> Result<Arc<InMemoryStore>> {
    let file = SnapshotFile::new(path);
    let store = match file
        .load()
        .with_context(|| format!("Failed to load store snapshot '{}'", path.display()))?
    {
        Some(snapshot) => InMemoryStore::from_snapshot(snapshot),
        None => InMemoryStore::new(),
    };
    Ok(Arc::new(store))
}

async fn persist_store(path: &Path, store: &InMemoryStore) -> Result<()> {
    let snapshot = store.snapshot().await;
    SnapshotFile::new(path)
        .save(&snapshot)
        .with_context(|| format!("Failed to write store snapshot '{}'", path.display()))
}

fn reconciler(memory: &Arc<InMemoryStore>, config: ReconcileConfig) -> Result<Reconciler<Arc<InMemoryStore>>> {
    Reconciler::with_config(memory.clone(), config).context("Invalid reconciliation settings")
}

async fn save(store_path: &Path, input: &Path, config: ReconcileConfig) -> Result<()> {
    let raw = fs::read_to_string(input).with_context(|| format!("Failed to read '{}'", input.display()))?;
    let tree: OrganizationTree =
        serde_json::from_str(&raw).with_context(|| format!("Invalid organization tree in '{}'", input.display()))?;

    let memory = open_store(store_path)?;
    let report = reconciler(&memory, config)?
        .reconcile(&tree)
        .await
        .context("Reconciliation aborted")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    persist_store(store_path, &memory).await
}

async fn delete(store_path: &Path, company: &str, owner: Option<&str>, config: ReconcileConfig) -> Result<()> {
    let company_id: RowId = company.parse().map_err(|e: String| anyhow!(e))?;

    let memory = open_store(store_path)?;
    let reconciler = reconciler(&memory, config)?;
    let report = match owner {
        Some(owner) => reconciler.cascade_delete_owned(&company_id, owner).await,
        None => reconciler.cascade_delete(&company_id).await,
    }
    .context("Delete aborted")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    persist_store(store_path, &memory).await?;

    if !report.deleted {
        bail!("Company {} was not deleted", company_id);
    }
    Ok(())
}

async fn show(store_path: &Path) -> Result<()> {
    let memory = open_store(store_path)?;
    for (collection, count) in memory.counts().await {
        println!("{:<14} {}", collection.as_str(), count);
    }
    Ok(())
}
