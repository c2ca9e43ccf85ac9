//! Listing persistence with region safety checks
//!
//! Nothing reaches the datastore unless the owning variant belongs to the
//! worker's region and each listing's origin (storefront host, auction
//! marketplace id or peer host) belongs to that region too.

use std::fmt;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::strategy::SourceResult;
use crate::classify::{auction_site, marketplace_config, MarketplaceConfig};
use crate::error::{Error, RetrotrackErrorTrait};
use crate::models::{Condition, NewListing, Origin, Region, RegionTag, SourceKind, Variant};
use crate::storage::Repository;
use crate::utils::host_matches;

/// Why a listing's origin was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginRejection {
    /// Storefront host outside the region's domain pool
    OutsidePool(String),
    /// Auction marketplace serving another region
    ForeignMarketplace(String),
    /// Peer host other than the region's peer marketplace
    ForeignPeer(String),
    /// Origin kind does not fit the source it came from
    Mismatched(Origin),
}

impl fmt::Display for OriginRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutsidePool(host) => write!(f, "host {host} not in domain pool"),
            Self::ForeignMarketplace(id) => write!(f, "marketplace {id} serves another region"),
            Self::ForeignPeer(host) => write!(f, "peer host {host} serves another region"),
            Self::Mismatched(origin) => write!(f, "unexpected origin {origin}"),
        }
    }
}

/// The region a worker acquires for, with everything it may persist from
#[derive(Debug, Clone, Copy)]
pub struct RegionScope<'a> {
    pub region: Region,
    /// Region that claims `Standard` variants
    pub fallback: Region,
    pub marketplace: &'static MarketplaceConfig,
    /// Storefront domains this region may query and persist from
    pub pool: &'a [String],
}

impl<'a> RegionScope<'a> {
    pub fn new(region: Region, fallback: Region, pool: &'a [String]) -> Self {
        Self {
            region,
            fallback,
            marketplace: marketplace_config(region),
            pool,
        }
    }

    /// Whether a variant with this tag belongs to the region
    pub fn claims(&self, tag: RegionTag) -> bool {
        tag.region_or(self.fallback) == self.region
    }

    pub fn in_pool(&self, host: &str) -> bool {
        self.pool.iter().any(|domain| host_matches(host, domain))
    }

    /// Check a listing's origin against the source it came from
    pub fn allows(&self, source: SourceKind, origin: &Origin) -> Result<(), OriginRejection> {
        match (source, origin) {
            (SourceKind::Storefront, Origin::Domain(host)) => {
                if self.in_pool(host) {
                    Ok(())
                } else {
                    Err(OriginRejection::OutsidePool(host.clone()))
                }
            }
            (SourceKind::Auction, Origin::Marketplace(id)) => match auction_site(id) {
                Some(site) if site.region == self.region => Ok(()),
                _ => Err(OriginRejection::ForeignMarketplace(id.clone())),
            },
            (SourceKind::Peer, Origin::Domain(host)) => match self.marketplace.peer_domain {
                Some(peer) if host_matches(host, peer) => Ok(()),
                _ => Err(OriginRejection::ForeignPeer(host.clone())),
            },
            (_, other) => Err(OriginRejection::Mismatched(other.clone())),
        }
    }
}

/// What one acquisition pass did for a variant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub variant_id: i64,
    pub written: usize,
    pub removed: usize,
    pub good_deals: usize,
    /// Listings refused by the origin check
    pub origin_rejected: usize,
    /// Sources that returned no data this pass
    pub failed_sources: Vec<SourceKind>,
    /// Set when the variant itself belongs to another region
    pub skipped: bool,
}

impl PassSummary {
    pub fn skipped(variant_id: i64) -> Self {
        Self {
            variant_id,
            skipped: true,
            ..Default::default()
        }
    }
}

/// Write the results of one pass for `variant`.
///
/// Each successful source replaces its listings for the variant (upsert plus
/// stale sweep); failed sources keep what they had. The variant's
/// acquisition timestamp is always stamped, and empty price slots are filled
/// from the observed listings priced in the region's currency.
pub fn persist_pass(
    repo: &dyn Repository,
    variant: &Variant,
    scope: &RegionScope<'_>,
    results: Vec<SourceResult>,
) -> Result<PassSummary> {
    if !scope.claims(variant.region_tag) {
        warn!(
            region = %scope.region,
            variant_id = variant.id,
            region_tag = %variant.region_tag,
            "Refusing to persist listings for a variant of another region"
        );
        return Ok(PassSummary::skipped(variant.id));
    }

    let mut summary = PassSummary {
        variant_id: variant.id,
        ..Default::default()
    };
    let mut observed: Vec<(Condition, f64)> = Vec::new();

    for result in results {
        let outcome = match result.outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = Error::from(e);
                warn!(
                    region = %scope.region,
                    variant_id = variant.id,
                    source = %result.kind,
                    category = err.category().as_str(),
                    recoverable = err.is_recoverable(),
                    error = %err,
                    "Source returned no data, keeping existing listings"
                );
                summary.failed_sources.push(result.kind);
                continue;
            }
        };

        let received = outcome.accepted.len();
        let kept: Vec<NewListing> = outcome
            .accepted
            .into_iter()
            .filter(|listing| match scope.allows(result.kind, &listing.origin) {
                Ok(()) => true,
                Err(reason) => {
                    warn!(
                        region = %scope.region,
                        variant_id = variant.id,
                        source = %result.kind,
                        external_id = %listing.external_id,
                        reason = %reason,
                        "Listing rejected by region check"
                    );
                    false
                }
            })
            .collect();

        summary.origin_rejected += received - kept.len();

        // No conversion: only the region currency feeds the median
        observed.extend(
            kept.iter()
                .filter(|l| l.currency.eq_ignore_ascii_case(scope.marketplace.currency))
                .map(|l| (l.condition, l.price)),
        );
        summary.good_deals += kept.iter().filter(|l| l.is_good_deal).count();

        let stats = repo.replace_listings(variant.id, result.kind, &kept)?;
        summary.written += stats.inserted + stats.updated;
        summary.removed += stats.removed;

        debug!(
            variant_id = variant.id,
            source = %result.kind,
            inserted = stats.inserted,
            updated = stats.updated,
            removed = stats.removed,
            "Listings replaced"
        );
    }

    let mut prices = variant.prices;
    let filled = prices.fill_from_observations(&observed);
    repo.record_acquisition(variant.id, Utc::now(), filled.then_some(&prices))?;

    info!(
        region = %scope.region,
        variant_id = variant.id,
        written = summary.written,
        removed = summary.removed,
        good_deals = summary.good_deals,
        "Acquisition pass persisted"
    );
    Ok(summary)
}
