//! Geoentity ingester service.
//!
//! Runs the ingestion-and-hierarchy pipeline over an ordered entity list
//! (GeoJSON layers into PostGIS with spatial parent linkage), and rebuilds
//! multi-resolution geometry pyramids per source layer.

mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::RunConfig;
use ingestion::{EntityOutcome, GeoJsonFileSource, Orchestrator};
use pyramid::PyramidBuilder;
use storage::Store;

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Geoentity ingestion and pyramid generation for geoentity services")]
struct Args {
    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion pipeline over a configured entity list
    Run {
        /// Run configuration file path
        #[arg(short, long, default_value = "/etc/ingester/run.yaml")]
        config: String,
    },
    /// Rebuild all pyramid levels for one source
    Pyramid {
        /// Source id to rebuild
        #[arg(long)]
        source_id: i64,

        /// Treat the layer as polygons (enables simplification and repair)
        #[arg(long)]
        polygon: bool,

        /// Database connection URL (or DATABASE_URL)
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Report sources that have no pyramid rows yet
    PyramidStatus {
        /// Database connection URL (or DATABASE_URL)
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Run { config } => run_ingestion(&config).await,
        Command::Pyramid {
            source_id,
            polygon,
            database_url,
        } => rebuild_pyramid(&database_url, source_id, polygon).await,
        Command::PyramidStatus { database_url } => pyramid_status(&database_url).await,
    }
}

async fn run_ingestion(config_path: &str) -> Result<()> {
    info!(config = %config_path, "Starting geoentity ingestion");

    let config = RunConfig::from_yaml(config_path)?;
    let database_url = config.database_url()?;

    let store = Store::connect(&database_url).await?;
    store.migrate().await?;

    let orchestrator = Orchestrator::with_store(
        Box::new(config.clone()),
        Box::new(GeoJsonFileSource),
        store,
    );

    let summary = orchestrator.run().await?;

    for (key, outcome) in &summary.outcomes {
        match outcome {
            EntityOutcome::Ingested {
                source_id, stats, ..
            } => info!(
                entity = %key,
                source_id,
                processed = stats.processed,
                failed = stats.failed,
                skipped = stats.skipped,
                "Entity ingested"
            ),
            EntityOutcome::Skipped { reason } => {
                info!(entity = %key, reason = %reason, "Entity skipped")
            }
        }
    }

    info!(
        ingested = summary.ingested(),
        skipped = summary.skipped(),
        "Ingestion finished"
    );
    Ok(())
}

async fn rebuild_pyramid(database_url: &str, source_id: i64, polygon: bool) -> Result<()> {
    let store = Store::connect(database_url).await?;
    store.migrate().await?;

    let builder = PyramidBuilder::new(store);
    let mut progress = builder.rebuild(source_id, polygon);

    while let Some(line) = progress.recv().await {
        info!("{}", line);
    }

    Ok(())
}

async fn pyramid_status(database_url: &str) -> Result<()> {
    let store = Store::connect(database_url).await?;
    store.migrate().await?;

    let missing = store.sources_without_pyramid().await?;
    if missing.is_empty() {
        info!("All registered sources have pyramid levels");
    } else {
        for source in &missing {
            let entities = store.entity_count(source.id).await?;
            info!(id = source.id, name = %source.name, entities, "Source has no pyramid levels");
        }
        info!(count = missing.len(), "Sources awaiting pyramid generation");
    }

    Ok(())
}
