//! Market data acquisition for one variant
//!
//! [`Acquirer::acquire`] runs a full pass in three phases: a region check on
//! the variant, untransacted network fetches through the variant's
//! [`Strategy`], then one short write per source in [`persist_pass`].

pub mod persist;
pub mod strategy;

use anyhow::Result;
use tracing::{debug, warn};

use crate::models::Variant;
use crate::sources::SourceSet;
use crate::storage::SharedRepository;

pub use persist::{persist_pass, OriginRejection, PassSummary, RegionScope};
pub use strategy::{FilterOutcome, Rejection, SearchContext, SourceResult, Strategy};

/// Candidates requested per source; each source clamps to its own limit
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Runs acquisition passes against a repository and a set of sources
#[derive(Clone)]
pub struct Acquirer {
    repo: SharedRepository,
    sources: SourceSet,
    limit: usize,
}

impl Acquirer {
    pub fn new(repo: SharedRepository, sources: SourceSet) -> Self {
        Self {
            repo,
            sources,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.repo
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// Acquire listings for `variant` within `scope`, querying `domain` for
    /// the storefront.
    ///
    /// A variant outside the scope is skipped before any source is called.
    pub async fn acquire(
        &self,
        variant: &Variant,
        scope: &RegionScope<'_>,
        domain: Option<&str>,
    ) -> Result<PassSummary> {
        if !scope.claims(variant.region_tag) {
            warn!(
                region = %scope.region,
                variant_id = variant.id,
                region_tag = %variant.region_tag,
                "Variant belongs to another region, not fetching"
            );
            return Ok(PassSummary::skipped(variant.id));
        }

        let domain = domain.filter(|d| {
            let allowed = scope.in_pool(d);
            if !allowed {
                warn!(region = %scope.region, domain = d, "Domain outside pool, skipping storefront");
            }
            allowed
        });

        let strategy = Strategy::for_variant(variant);
        debug!(
            region = %scope.region,
            variant_id = variant.id,
            strategy = ?strategy,
            domain = domain.unwrap_or("-"),
            "Acquiring"
        );

        let ctx = SearchContext {
            region: scope.region,
            marketplace: scope.marketplace,
            domain,
            limit: self.limit,
        };
        let results = strategy.collect(variant, &self.sources, &ctx).await;

        persist_pass(self.repo.as_ref(), variant, scope, results)
    }
}

impl std::fmt::Debug for Acquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquirer")
            .field("sources", &self.sources)
            .field("limit", &self.limit)
            .finish()
    }
}
