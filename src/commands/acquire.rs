use anyhow::{bail, Context, Result};
use tokio::sync::watch;

use retrotrack::acquisition::Acquirer;
use retrotrack::config::Config;
use retrotrack::models::Region;
use retrotrack::sources::SourceSet;
use retrotrack::worker::{Coordinator, RegionalWorker};

use super::catalog::open_repository;

fn acquirer(config: &Config) -> Result<Acquirer> {
    config.require_auction_credentials()?;

    let sources = SourceSet::from_config(config).context("Failed to build listing sources")?;
    if sources.is_empty() {
        bail!("No listing source is enabled");
    }
    Ok(Acquirer::new(open_repository(config)?, sources))
}

/// Run the regional workers until Ctrl+C
pub async fn run(config: Config, regions: Vec<Region>) -> Result<()> {
    let regions = if regions.is_empty() {
        config.worker.regions.clone()
    } else {
        regions
    };

    let coordinator = Coordinator::new(config.clone(), acquirer(&config)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                println!("\nShutdown signal received, finishing current items...");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!("Failed to wait for Ctrl+C: {}", e);
            }
        }
    });

    println!(
        "Running workers for: {}",
        regions
            .iter()
            .map(Region::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let results = coordinator.run(&regions, shutdown_rx).await?;

    println!("\nWorkers stopped");
    for (region, stats) in results {
        println!(
            "  {region}: {} batches, {} processed, {} failed, {} skipped, {} backoffs",
            stats.batches, stats.processed, stats.failures, stats.skipped, stats.backoffs
        );
    }
    Ok(())
}

/// Acquire a single variant immediately
pub async fn scan(config: Config, variant_id: i64) -> Result<()> {
    let acquirer = acquirer(&config)?;
    let variant = acquirer
        .repository()
        .get_variant(variant_id)?
        .with_context(|| format!("Variant {variant_id} not found"))?;

    let region = variant.region_tag.region_or(config.worker.fallback_region);
    let mut worker = RegionalWorker::from_config(region, &config, acquirer.clone());
    let summary = worker.process_variant(variant_id).await?;

    println!("Scan of variant {variant_id} ({region})");
    if summary.skipped {
        println!("  Skipped: variant does not belong to {region}");
        return Ok(());
    }
    println!("  Written:          {}", summary.written);
    println!("  Removed (stale):  {}", summary.removed);
    println!("  Good deals:       {}", summary.good_deals);
    println!("  Origin rejected:  {}", summary.origin_rejected);
    if !summary.failed_sources.is_empty() {
        println!(
            "  Failed sources:   {}",
            summary
                .failed_sources
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    for listing in acquirer.repository().listings_for(variant_id)? {
        println!(
            "  [{}] {:.2} {} {} {}{}",
            listing.source,
            listing.price,
            listing.currency,
            listing.condition,
            listing.title,
            if listing.is_good_deal { "  (deal)" } else { "" }
        );
    }
    Ok(())
}
