use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use retrotrack::config::Config;
use retrotrack::models::Region;

mod commands;

#[derive(Parser)]
#[command(
    name = "retrotrack",
    version,
    about = "Retro game price tracker with regional marketplace workers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import raw variants from a JSON file
    Import {
        /// JSON array of variants
        file: PathBuf,
    },

    /// Consolidate unresolved variants into canonical entities
    Resolve,

    /// Run the regional acquisition workers until interrupted
    Run {
        /// Region to run (repeatable); defaults to the configured regions
        #[arg(short, long = "region")]
        regions: Vec<Region>,
    },

    /// Acquire listings for one variant now
    Scan {
        /// Variant id
        variant_id: i64,
    },

    /// Query a region's sources without writing anything
    Probe {
        /// Region whose storefront pool and marketplaces are queried
        #[arg(short, long)]
        region: Region,

        /// Search query
        query: String,
    },

    /// Unlink all variants and delete canonical entities
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize tracing/logging
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&format, &config.logging.level, cli.verbose)?;

    config.validate().context("Invalid configuration")?;

    tracing::info!("retrotrack starting");

    match cli.command {
        Commands::Import { file } => {
            tracing::info!(file = %file.display(), "Starting import command");
            commands::import(&config, &file)?;
        }

        Commands::Resolve => {
            tracing::info!("Starting resolve command");
            commands::resolve(&config)?;
        }

        Commands::Run { regions } => {
            tracing::info!(regions = ?regions, "Starting run command");
            commands::run(config, regions).await?;
        }

        Commands::Scan { variant_id } => {
            tracing::info!(variant_id, "Starting scan command");
            commands::scan(config, variant_id).await?;
        }

        Commands::Probe { region, query } => {
            tracing::info!(region = %region, query = %query, "Starting probe command");
            commands::probe(config, region, &query).await?;
        }

        Commands::Reset => {
            tracing::info!("Starting reset command");
            commands::reset(&config)?;
        }
    }

    tracing::info!("retrotrack completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("retrotrack=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("retrotrack={level},warn"))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
