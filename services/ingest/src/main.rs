//! `pictor-ingest` command line.
//!
//! Ingests images from files or URLs and reads back stored records, printing
//! JSON on stdout. Logs go to stderr.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pictor_ingest::{ImagePipeline, IngestConfig, LoggingConfig};
use pictor_storage::{ImageRecord, MetadataRepository, PgMetadataStore};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pictor-ingest", version, about = "Ingest images and derive renditions")]
struct Cli {
    /// Extra configuration file, applied after config/default and config/{RUN_MODE}
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a local image file
    Upload {
        path: PathBuf,
        #[arg(long)]
        owner: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Fetch and ingest a remote image
    Fetch {
        url: String,
        #[arg(long)]
        owner: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Print one record
    Show { id: String },
    /// Print one page of records, newest first
    List {
        #[arg(long)]
        owner: Option<String>,
        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = IngestConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging)?;
    config.validate()?;

    info!(
        service = "pictor-ingest",
        version = env!("CARGO_PKG_VERSION"),
        "Starting"
    );

    let store = PgMetadataStore::connect(&config.database)
        .await
        .context("Failed to connect to metadata database")?;
    if config.database.run_migrations {
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let result = run(&config, Arc::new(store.clone()), cli.command).await;

    store.close().await;
    result
}

async fn run(
    config: &IngestConfig,
    repository: Arc<dyn MetadataRepository>,
    command: Command,
) -> anyhow::Result<()> {
    let pipeline = ImagePipeline::from_config(config, repository)
        .await
        .context("Failed to prepare image storage")?;

    match command {
        Command::Upload {
            path,
            owner,
            description,
        } => {
            let file = open_upload(&path).await?;
            let record = pipeline
                .create_from_upload(&owner, &description, file, &upload_name(&path))
                .await?;
            print_json(&record_json(&record))
        }
        Command::Fetch {
            url,
            owner,
            description,
        } => {
            let record = pipeline.create_from_url(&owner, &description, &url).await?;
            print_json(&record_json(&record))
        }
        Command::Show { id } => match pipeline.find(&id).await? {
            Some(record) => print_json(&record_json(&record)),
            None => bail!("Image {} not found", id),
        },
        Command::List { owner, page } => {
            let records = match owner {
                Some(owner) => pipeline.list_page_by_owner(&owner, page).await?,
                None => pipeline.list_page(page).await?,
            };
            let records: Vec<_> = records.iter().map(record_json).collect();
            print_json(&json!({ "page": page, "images": records }))
        }
    }
}

/// A missing file is treated as "no upload"; other open errors are fatal.
async fn open_upload(path: &Path) -> anyhow::Result<Option<tokio::fs::File>> {
    match tokio::fs::File::open(path).await {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to open {}", path.display())),
    }
}

fn upload_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn record_json(record: &ImageRecord) -> serde_json::Value {
    json!({
        "record": record,
        "routes": {
            "show": record.show_route(),
            "original": record.static_route(),
            "thumbnail": record.thumbnail_route(),
            "preview": record.preview_route(),
        }
    })
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize the tracing/logging subsystem.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("pictor_ingest={}", level).parse()?)
        .add_directive(format!("pictor_storage={}", level).parse()?)
        .add_directive("sqlx=warn".parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}
