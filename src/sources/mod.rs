//! External listing sources
//!
//! Every source answers a [`SearchRequest`] with raw [`ListingCandidate`]s.
//! Sources never decide whether a candidate is acceptable; the acquisition
//! strategies and the worker's safety checks do that.
//!
//! - [`auction::AuctionSource`]: OAuth2-authenticated marketplace API (JSON)
//! - [`storefront::StorefrontSource`]: HTML storefront scraping
//! - [`peer::PeerSource`]: peer-to-peer marketplace behind a session cookie

pub mod auction;
pub mod headers;
pub mod peer;
pub mod storefront;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::classify::MarketplaceConfig;
use crate::config::Config;
use crate::models::{ListingCandidate, Region, SourceKind};
use crate::utils::error::FetchError;

pub use auction::AuctionSource;
pub use peer::PeerSource;
pub use storefront::StorefrontSource;

/// One search issued against a source
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub limit: usize,
    /// Auction category filter
    pub category_id: Option<u32>,
    pub region: Region,
    pub marketplace: &'static MarketplaceConfig,
    /// Storefront domain picked from the worker's pool
    pub domain: Option<&'a str>,
}

/// A searchable external marketplace
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Search the source; transient failures come back as `Err` and are
    /// treated as "no result" by callers
    async fn search(&self, request: &SearchRequest<'_>)
        -> Result<Vec<ListingCandidate>, FetchError>;
}

/// Sources available to the workers, in query order
#[derive(Clone, Default)]
pub struct SourceSet {
    sources: Vec<Arc<dyn ListingSource>>,
}

impl SourceSet {
    pub fn new(sources: Vec<Arc<dyn ListingSource>>) -> Self {
        Self { sources }
    }

    /// Build the enabled sources from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut sources: Vec<Arc<dyn ListingSource>> = Vec::new();

        if config.auction.enabled {
            sources.push(Arc::new(AuctionSource::new(
                &config.auction,
                config.auction_timeout(),
            )?));
        }
        if config.storefront.enabled {
            sources.push(Arc::new(StorefrontSource::new(
                &config.storefront,
                config.storefront_timeout(),
            )?));
        }
        if config.peer.enabled {
            sources.push(Arc::new(PeerSource::new(&config.peer, config.peer_timeout())?));
        }

        Ok(Self { sources })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ListingSource>> {
        self.sources.iter()
    }

    pub fn kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}
