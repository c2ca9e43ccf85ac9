//! Common test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use retrotrack::acquisition::Acquirer;
use retrotrack::config::PacingBounds;
use retrotrack::models::{
    CanonicalEntity, Listing, ListingCandidate, NewEntity, NewListing, NewVariant, Origin,
    Prices, Region, RegionTag, SourceKind, Variant,
};
use retrotrack::sources::{ListingSource, SearchRequest, SourceSet};
use retrotrack::storage::{ReplaceStats, Repository, SharedRepository};
use retrotrack::utils::error::FetchError;
use retrotrack::worker::{DomainPool, Pacing, RegionalWorker, WorkerTiming};

/// Insert a variant and link it to its own entity with `tag`
pub fn seed_variant(
    repo: &SharedRepository,
    product: &str,
    console: &str,
    tag: RegionTag,
    loose: Option<f64>,
) -> Variant {
    let mut raw = NewVariant::new(product, console);
    raw.prices = Prices {
        loose,
        ..Default::default()
    };
    let id = repo.insert_variant(&raw).unwrap();

    let entity = repo
        .create_entity(&NewEntity {
            console_family: console.to_string(),
            title: product.to_string(),
            slug: format!("test-entity-{id}"),
            match_key: format!("test-key-{id}"),
            metadata: Default::default(),
        })
        .unwrap();
    repo.link_variants(entity.id, &[(id, tag)]).unwrap();
    repo.get_variant(id).unwrap().unwrap()
}

pub fn candidate(source: SourceKind, id: &str, title: &str, price: f64, origin: Origin) -> ListingCandidate {
    ListingCandidate {
        source,
        external_id: id.to_string(),
        title: title.to_string(),
        price,
        currency: "EUR".to_string(),
        url: None,
        image_url: None,
        origin,
        condition_hint: None,
    }
}

/// Worker timing with no pacing and short idle/backoff pauses
pub fn fast_timing() -> WorkerTiming {
    let zero = PacingBounds {
        min_ms: 0,
        max_ms: 0,
    };
    WorkerTiming {
        batch_size: 10,
        pacing: Pacing::new(zero, zero),
        idle: Duration::from_millis(10),
        backoff: Duration::from_millis(10),
    }
}

pub fn worker(
    region: Region,
    fallback: Region,
    domains: &[&str],
    repo: SharedRepository,
    sources: Vec<Arc<dyn ListingSource>>,
) -> RegionalWorker {
    worker_with_timing(region, fallback, domains, repo, sources, fast_timing())
}

pub fn worker_with_timing(
    region: Region,
    fallback: Region,
    domains: &[&str],
    repo: SharedRepository,
    sources: Vec<Arc<dyn ListingSource>>,
    timing: WorkerTiming,
) -> RegionalWorker {
    RegionalWorker::new(
        region,
        fallback,
        DomainPool::new(domains.iter().copied()),
        timing,
        Acquirer::new(repo, SourceSet::new(sources)),
    )
}

/// Upcast a concrete source for a `SourceSet`
pub fn shared<S: ListingSource + 'static>(source: Arc<S>) -> Arc<dyn ListingSource> {
    source
}

/// Source answering every search with a fixed, replaceable candidate list
pub struct StaticSource {
    kind: SourceKind,
    candidates: Mutex<Vec<ListingCandidate>>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(kind: SourceKind, candidates: Vec<ListingCandidate>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            candidates: Mutex::new(candidates),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, candidates: Vec<ListingCandidate>) {
        *self.candidates.lock().unwrap() = candidates;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSource for StaticSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn search(&self, _request: &SearchRequest<'_>) -> Result<Vec<ListingCandidate>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.candidates.lock().unwrap().clone())
    }
}

/// Source that always times out
pub struct FailingSource(pub SourceKind);

#[async_trait]
impl ListingSource for FailingSource {
    fn kind(&self) -> SourceKind {
        self.0
    }

    async fn search(&self, _request: &SearchRequest<'_>) -> Result<Vec<ListingCandidate>, FetchError> {
        Err(FetchError::Timeout)
    }
}

/// Source that panics mid-search
pub struct PanickingSource;

#[async_trait]
impl ListingSource for PanickingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Auction
    }

    async fn search(&self, _request: &SearchRequest<'_>) -> Result<Vec<ListingCandidate>, FetchError> {
        panic!("source exploded");
    }
}

/// Storefront search page with one result row per `(asin, title, price, href)`
pub fn storefront_page(rows: &[(&str, &str, &str, &str)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(asin, title, price, href)| {
            format!(
                r#"<div data-component-type="s-search-result" data-asin="{asin}">
                    <h2><a href="{href}"><span>{title}</span></a></h2>
                    <span class="a-price"><span class="a-offscreen">{price}</span></span>
                    <img class="s-image" src="https://images.example/{asin}.jpg">
                </div>"#
            )
        })
        .collect();
    format!("<!DOCTYPE html><html><body><div class=\"s-main-slot\">{rows}</div></body></html>")
}

/// Repository whose batch selection always fails, as when the database is
/// locked by another writer; everything else goes to `inner`
pub struct LockedRepository {
    pub inner: SharedRepository,
}

impl Repository for LockedRepository {
    fn insert_variant(&self, variant: &NewVariant) -> Result<i64> {
        self.inner.insert_variant(variant)
    }

    fn get_variant(&self, id: i64) -> Result<Option<Variant>> {
        self.inner.get_variant(id)
    }

    fn unresolved_variants(&self) -> Result<Vec<Variant>> {
        self.inner.unresolved_variants()
    }

    fn variants_for_entity(&self, entity_id: i64) -> Result<Vec<Variant>> {
        self.inner.variants_for_entity(entity_id)
    }

    fn find_entity_by_slug(&self, slug: &str) -> Result<Option<CanonicalEntity>> {
        self.inner.find_entity_by_slug(slug)
    }

    fn create_entity(&self, entity: &NewEntity) -> Result<CanonicalEntity> {
        self.inner.create_entity(entity)
    }

    fn list_entities(&self) -> Result<Vec<CanonicalEntity>> {
        self.inner.list_entities()
    }

    fn link_variants(&self, entity_id: i64, links: &[(i64, RegionTag)]) -> Result<usize> {
        self.inner.link_variants(entity_id, links)
    }

    fn reset_identities(&self) -> Result<usize> {
        self.inner.reset_identities()
    }

    fn select_batch(&self, _region: Region, _include_standard: bool, _limit: usize) -> Result<Vec<Variant>> {
        Err(anyhow!("database is locked"))
    }

    fn replace_listings(
        &self,
        variant_id: i64,
        source: SourceKind,
        listings: &[NewListing],
    ) -> Result<ReplaceStats> {
        self.inner.replace_listings(variant_id, source, listings)
    }

    fn listings_for(&self, variant_id: i64) -> Result<Vec<Listing>> {
        self.inner.listings_for(variant_id)
    }

    fn record_acquisition(
        &self,
        variant_id: i64,
        at: DateTime<Utc>,
        prices: Option<&Prices>,
    ) -> Result<()> {
        self.inner.record_acquisition(variant_id, at, prices)
    }
}
