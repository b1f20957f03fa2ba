mod display;
mod fetch;
mod purge;
mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use monarch_store::{AssetStore, DuckStore, StoreError};
use tracing_subscriber::EnvFilter;

/// Randomized, de-duplicated sampling of monarch butterfly observations
#[derive(Parser)]
#[command(name = "monarch", version, about)]
struct Cli {
    /// Path to the DuckDB database
    #[arg(long, env = "MONARCH_DB", default_value = "data/monarch.duckdb", global = true)]
    db: PathBuf,

    /// Directory downloaded images are written to
    #[arg(long, env = "MONARCH_ASSET_DIR", default_value = "data/images", global = true)]
    asset_dir: PathBuf,

    /// Path prefix stored with each record, as the annotation tool sees the image directory
    #[arg(long, env = "MONARCH_ASSET_PREFIX", default_value = "/data/images", global = true)]
    asset_prefix: String,

    /// Log output format
    #[arg(long, env = "MONARCH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema, migrating an older one if needed
    Init,
    /// Acquire new observations and their images from the catalog
    Fetch(fetch::FetchArgs),
    /// Push stored observations to Label Studio as annotation tasks
    Sync(sync::SyncArgs),
    /// Delete all observations, labels and downloaded images
    Purge {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show one stored observation
    Show {
        /// Observation id
        id: i64,
    },
    /// Show row counts
    Stats,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Init => cmd_init(&cli.db),
        Commands::Fetch(args) => {
            let store = open_store(&cli.db)?;
            let assets = open_assets(&cli.asset_dir, &cli.asset_prefix)?;
            fetch::run(args, store, assets).await
        }
        Commands::Sync(args) => {
            let store = open_store(&cli.db)?;
            sync::run(args, &store).await
        }
        Commands::Purge { yes } => {
            let store = open_store(&cli.db)?;
            let assets = open_assets(&cli.asset_dir, &cli.asset_prefix)?;
            purge::run(&store, &assets, yes)
        }
        Commands::Show { id } => cmd_show(&cli.db, id),
        Commands::Stats => cmd_stats(&cli.db),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn open_store(db: &Path) -> anyhow::Result<DuckStore> {
    // A second writer process holding the file fails here.
    DuckStore::open_persistent(db).with_context(|| format!("opening database {}", db.display()))
}

fn open_assets(dir: &Path, prefix: &str) -> anyhow::Result<AssetStore> {
    AssetStore::open(dir, prefix).with_context(|| format!("opening image directory {}", dir.display()))
}

fn cmd_init(db: &Path) -> anyhow::Result<()> {
    let store = open_store(db)?;
    let status = store.schema_status();
    if status.created {
        println!("Created schema in {}", db.display());
    } else if status.migrated {
        println!("Migrated schema in {} (added raw_payload)", db.display());
    } else {
        println!("Schema in {} is up to date", db.display());
    }
    println!("  observations: {}", store.observation_count()?);
    println!("  labels:       {}", store.labels_count()?);
    Ok(())
}

fn cmd_show(db: &Path, id: i64) -> anyhow::Result<()> {
    let store = open_store(db)?;
    let batch = match store.get_observation(id) {
        Ok(batch) => batch,
        Err(StoreError::NoResults) => bail!("observation {id} is not stored"),
        Err(e) => return Err(e).context("reading observation"),
    };
    display::print_observation_card(&batch);

    let labels = store.labels_for(id).context("reading labels")?;
    if labels.iter().any(|b| b.num_rows() > 0) {
        println!("Labels");
        println!("{}", arrow::util::pretty::pretty_format_batches(&labels)?);
    }
    Ok(())
}

fn cmd_stats(db: &Path) -> anyhow::Result<()> {
    let store = open_store(db)?;
    println!("Database: {}", db.display());
    println!("  observations: {}", store.observation_count()?);
    println!("  labels:       {}", store.labels_count()?);
    Ok(())
}
