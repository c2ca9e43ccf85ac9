use anyhow::Result;

use retrotrack::acquisition::RegionScope;
use retrotrack::classify::{candidate_region, marketplace_config};
use retrotrack::config::Config;
use retrotrack::models::{Region, SourceKind};
use retrotrack::sources::{PeerSource, StorefrontSource};

/// Query every storefront of a region's pool in parallel, plus the region's
/// peer marketplace, and report what the workers would see
pub async fn probe(config: Config, region: Region, query: &str) -> Result<()> {
    let marketplace = marketplace_config(region);
    let pool = config.storefront.pools.for_region(region);
    let scope = RegionScope::new(region, config.worker.fallback_region, pool);

    println!("Probing {region} for \"{query}\"");
    println!("========================");

    if config.storefront.enabled && !pool.is_empty() {
        let storefront = StorefrontSource::new(&config.storefront, config.storefront_timeout())?;
        let results = storefront
            .scrape_batch(pool, query, marketplace.accept_language)
            .await;

        for (domain, result) in results {
            match result {
                Ok(candidates) => {
                    println!("\n{domain}: {} results", candidates.len());
                    for candidate in candidates {
                        let verdict = match scope.allows(SourceKind::Storefront, &candidate.origin) {
                            Ok(()) => "ok".to_string(),
                            Err(reason) => format!("rejected: {reason}"),
                        };
                        println!(
                            "  {:.2} {} {} [{}] ({verdict})",
                            candidate.price,
                            candidate.currency,
                            candidate.title,
                            candidate_region(&candidate.title, region)
                        );
                    }
                }
                Err(e) => println!("\n{domain}: failed ({e})"),
            }
        }
    }

    if let (true, Some(domain)) = (config.peer.enabled, marketplace.peer_domain) {
        let peer = PeerSource::new(&config.peer, config.peer_timeout())?;
        let outcome = peer
            .search_detailed(domain, query, config.peer.result_limit, marketplace.accept_language)
            .await;

        println!("\n{domain}: {} results", outcome.candidates.len());
        for candidate in &outcome.candidates {
            println!(
                "  {:.2} {} {}",
                candidate.price, candidate.currency, candidate.title
            );
        }
        if let Some(debug) = outcome.debug {
            println!(
                "  failed at {} (status {:?}, refreshed: {}): {}",
                debug.stage, debug.status, debug.refreshed, debug.detail
            );
        }
    }

    Ok(())
}
