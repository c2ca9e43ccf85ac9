//! Repository Pattern for Database Abstraction
//!
//! Trait-based datastore access so the resolver and workers are decoupled
//! from the storage implementation:
//! - `SqliteRepository` for production (WAL, one short transaction per call)
//! - `MockRepository` for tests
//!
//! Every method opens and closes its own unit of work. Callers never hold a
//! transaction across network I/O: read, release, fetch, then write.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{
    CanonicalEntity, Condition, Listing, ListingStatus, Metadata, NewEntity, NewListing,
    NewVariant, Prices, Region, RegionTag, SourceKind, Variant,
};

// ============================================================================
// Core Types
// ============================================================================

/// Outcome of writing one (variant, source) batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceStats {
    pub inserted: usize,
    pub updated: usize,
    /// Listings removed by the stale sweep
    pub removed: usize,
}

// ============================================================================
// Repository Trait
// ============================================================================

/// Datastore operations used by the resolver and the acquisition workers
pub trait Repository: Send + Sync {
    /// Insert a raw variant; it starts unresolved with a `Standard` tag
    fn insert_variant(&self, variant: &NewVariant) -> Result<i64>;

    /// Get a variant by id
    fn get_variant(&self, id: i64) -> Result<Option<Variant>>;

    /// Variants without an owning canonical entity, oldest id first
    fn unresolved_variants(&self) -> Result<Vec<Variant>>;

    /// Variants linked to an entity
    fn variants_for_entity(&self, entity_id: i64) -> Result<Vec<Variant>>;

    /// Look up a canonical entity by slug
    fn find_entity_by_slug(&self, slug: &str) -> Result<Option<CanonicalEntity>>;

    /// Create a canonical entity; fails if the slug is taken
    fn create_entity(&self, entity: &NewEntity) -> Result<CanonicalEntity>;

    /// All canonical entities, by id
    fn list_entities(&self) -> Result<Vec<CanonicalEntity>>;

    /// Link ownerless variants to an entity and set their region tags.
    ///
    /// Variants that already have an owner are left untouched. Returns the
    /// number of variants linked.
    fn link_variants(&self, entity_id: i64, links: &[(i64, RegionTag)]) -> Result<usize>;

    /// Administrative reset: unlink every variant and delete all entities.
    /// Returns the number of entities removed.
    fn reset_identities(&self) -> Result<usize>;

    /// Acquisition candidates for a region, least recently acquired first.
    ///
    /// `include_standard` lets the fallback region's worker claim variants
    /// with a `Standard` tag.
    fn select_batch(&self, region: Region, include_standard: bool, limit: usize)
        -> Result<Vec<Variant>>;

    /// Upsert the current batch for (variant, source) and delete every
    /// listing of that pair that is not in the batch
    fn replace_listings(
        &self,
        variant_id: i64,
        source: SourceKind,
        listings: &[NewListing],
    ) -> Result<ReplaceStats>;

    /// Listings for a variant, by source then external id
    fn listings_for(&self, variant_id: i64) -> Result<Vec<Listing>>;

    /// Stamp the acquisition time, optionally replacing reference prices
    fn record_acquisition(
        &self,
        variant_id: i64,
        at: DateTime<Utc>,
        prices: Option<&Prices>,
    ) -> Result<()>;
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

// ============================================================================
// SQLite Implementation
// ============================================================================

const VARIANT_COLUMNS: &str = "id, external_id, console_name, product_name, category, \
     loose_price, cib_price, new_price, box_only_price, manual_only_price, region_tag, \
     asin, ean, gtin, genre, publisher, developer, release_date, entity_id, last_acquired_at";

const ENTITY_COLUMNS: &str =
    "id, console_family, title, slug, match_key, genre, publisher, developer, release_date";

const LISTING_COLUMNS: &str = "id, variant_id, source, external_id, title, price, currency, \
     condition, status, url, is_good_deal, last_updated";

fn variant_from_row(row: &Row<'_>) -> rusqlite::Result<Variant> {
    Ok(Variant {
        id: row.get(0)?,
        external_id: row.get(1)?,
        console_name: row.get(2)?,
        product_name: row.get(3)?,
        category: row.get(4)?,
        prices: Prices {
            loose: row.get(5)?,
            cib: row.get(6)?,
            new: row.get(7)?,
            box_only: row.get(8)?,
            manual_only: row.get(9)?,
        },
        region_tag: row
            .get::<_, String>(10)?
            .parse()
            .unwrap_or(RegionTag::Standard),
        asin: row.get(11)?,
        ean: row.get(12)?,
        gtin: row.get(13)?,
        metadata: Metadata {
            genre: row.get(14)?,
            publisher: row.get(15)?,
            developer: row.get(16)?,
            release_date: parse_date(row.get(17)?),
        },
        entity_id: row.get(18)?,
        last_acquired_at: row
            .get::<_, Option<String>>(19)?
            .and_then(|s| parse_timestamp(&s)),
    })
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<CanonicalEntity> {
    Ok(CanonicalEntity {
        id: row.get(0)?,
        console_family: row.get(1)?,
        title: row.get(2)?,
        slug: row.get(3)?,
        match_key: row.get(4)?,
        metadata: Metadata {
            genre: row.get(5)?,
            publisher: row.get(6)?,
            developer: row.get(7)?,
            release_date: parse_date(row.get(8)?),
        },
    })
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        id: row.get(0)?,
        variant_id: row.get(1)?,
        source: row
            .get::<_, String>(2)?
            .parse()
            .unwrap_or(SourceKind::Storefront),
        external_id: row.get(3)?,
        title: row.get(4)?,
        price: row.get(5)?,
        currency: row.get(6)?,
        condition: row
            .get::<_, String>(7)?
            .parse()
            .unwrap_or(Condition::Loose),
        status: row
            .get::<_, String>(8)?
            .parse()
            .unwrap_or(ListingStatus::Active),
        url: row.get(9)?,
        is_good_deal: row.get(10)?,
        last_updated: parse_timestamp(&row.get::<_, String>(11)?).unwrap_or_else(Utc::now),
    })
}

/// SQLite implementation of `Repository`
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) a repository at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite repository initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS canonical_entities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    console_family TEXT NOT NULL,
                    title TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    match_key TEXT NOT NULL,
                    genre TEXT,
                    publisher TEXT,
                    developer TEXT,
                    release_date TEXT
                );

                CREATE TABLE IF NOT EXISTS variants (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    external_id TEXT UNIQUE,
                    console_name TEXT NOT NULL,
                    product_name TEXT NOT NULL,
                    category TEXT,
                    loose_price REAL,
                    cib_price REAL,
                    new_price REAL,
                    box_only_price REAL,
                    manual_only_price REAL,
                    region_tag TEXT NOT NULL DEFAULT 'standard',
                    asin TEXT,
                    ean TEXT,
                    gtin TEXT,
                    genre TEXT,
                    publisher TEXT,
                    developer TEXT,
                    release_date TEXT,
                    entity_id INTEGER REFERENCES canonical_entities(id),
                    last_acquired_at TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_variants_entity
                    ON variants(entity_id);

                CREATE INDEX IF NOT EXISTS idx_variants_region_acquired
                    ON variants(region_tag, last_acquired_at);

                CREATE TABLE IF NOT EXISTS listings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    variant_id INTEGER NOT NULL REFERENCES variants(id) ON DELETE CASCADE,
                    source TEXT NOT NULL,
                    external_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    price REAL NOT NULL,
                    currency TEXT NOT NULL,
                    condition TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'active',
                    url TEXT,
                    is_good_deal INTEGER NOT NULL DEFAULT 0,
                    last_updated TEXT NOT NULL,
                    UNIQUE(variant_id, source, external_id)
                );

                CREATE INDEX IF NOT EXISTS idx_listings_variant_source
                    ON listings(variant_id, source);
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }

    fn query_variants(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Variant>> {
        let mut stmt = conn.prepare(sql).context("Failed to prepare variant query")?;
        let variants = stmt
            .query_map(params, variant_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(variants)
    }
}

impl Repository for SqliteRepository {
    fn insert_variant(&self, variant: &NewVariant) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO variants (
                    external_id, console_name, product_name, category,
                    loose_price, cib_price, new_price, box_only_price, manual_only_price,
                    asin, ean, gtin, genre, publisher, developer, release_date
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                "#,
            params![
                variant.external_id,
                variant.console_name,
                variant.product_name,
                variant.category,
                variant.prices.loose,
                variant.prices.cib,
                variant.prices.new,
                variant.prices.box_only,
                variant.prices.manual_only,
                variant.asin,
                variant.ean,
                variant.gtin,
                variant.metadata.genre,
                variant.metadata.publisher,
                variant.metadata.developer,
                variant.metadata.release_date.map(|d| d.to_string()),
            ],
        )
        .context("Failed to insert variant")?;

        Ok(conn.last_insert_rowid())
    }

    fn get_variant(&self, id: i64) -> Result<Option<Variant>> {
        let conn = self.conn()?;
        let variant = conn
            .query_row(
                &format!("SELECT {VARIANT_COLUMNS} FROM variants WHERE id = ?1"),
                params![id],
                variant_from_row,
            )
            .optional()
            .context("Failed to get variant")?;
        Ok(variant)
    }

    fn unresolved_variants(&self) -> Result<Vec<Variant>> {
        let conn = self.conn()?;
        Self::query_variants(
            &conn,
            &format!("SELECT {VARIANT_COLUMNS} FROM variants WHERE entity_id IS NULL ORDER BY id"),
            &[],
        )
    }

    fn variants_for_entity(&self, entity_id: i64) -> Result<Vec<Variant>> {
        let conn = self.conn()?;
        Self::query_variants(
            &conn,
            &format!("SELECT {VARIANT_COLUMNS} FROM variants WHERE entity_id = ?1 ORDER BY id"),
            &[&entity_id],
        )
    }

    fn find_entity_by_slug(&self, slug: &str) -> Result<Option<CanonicalEntity>> {
        let conn = self.conn()?;
        let entity = conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM canonical_entities WHERE slug = ?1"),
                params![slug],
                entity_from_row,
            )
            .optional()
            .context("Failed to look up entity by slug")?;
        Ok(entity)
    }

    fn create_entity(&self, entity: &NewEntity) -> Result<CanonicalEntity> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO canonical_entities (
                    console_family, title, slug, match_key,
                    genre, publisher, developer, release_date
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            params![
                entity.console_family,
                entity.title,
                entity.slug,
                entity.match_key,
                entity.metadata.genre,
                entity.metadata.publisher,
                entity.metadata.developer,
                entity.metadata.release_date.map(|d| d.to_string()),
            ],
        )
        .with_context(|| format!("Failed to create entity with slug {}", entity.slug))?;

        Ok(CanonicalEntity {
            id: conn.last_insert_rowid(),
            console_family: entity.console_family.clone(),
            title: entity.title.clone(),
            slug: entity.slug.clone(),
            match_key: entity.match_key.clone(),
            metadata: entity.metadata.clone(),
        })
    }

    fn list_entities(&self) -> Result<Vec<CanonicalEntity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM canonical_entities ORDER BY id"
        ))?;
        let entities = stmt
            .query_map([], entity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entities)
    }

    fn link_variants(&self, entity_id: i64, links: &[(i64, RegionTag)]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut linked = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE variants SET entity_id = ?1, region_tag = ?2
                 WHERE id = ?3 AND entity_id IS NULL",
            )?;
            for (variant_id, tag) in links {
                linked += stmt.execute(params![entity_id, tag.as_str(), variant_id])?;
            }
        }
        tx.commit().context("Failed to commit variant links")?;
        Ok(linked)
    }

    fn reset_identities(&self) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE variants SET entity_id = NULL WHERE entity_id IS NOT NULL",
            [],
        )?;
        let removed = tx.execute("DELETE FROM canonical_entities", [])?;
        tx.commit().context("Failed to reset identities")?;
        Ok(removed)
    }

    fn select_batch(
        &self,
        region: Region,
        include_standard: bool,
        limit: usize,
    ) -> Result<Vec<Variant>> {
        let conn = self.conn()?;
        let standard = if include_standard {
            RegionTag::Standard.as_str()
        } else {
            // never matches a stored tag
            ""
        };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Self::query_variants(
            &conn,
            &format!(
                "SELECT {VARIANT_COLUMNS} FROM variants
                 WHERE region_tag = ?1 OR region_tag = ?2
                 ORDER BY last_acquired_at IS NOT NULL, last_acquired_at, id
                 LIMIT ?3"
            ),
            &[&region.as_str(), &standard, &limit],
        )
    }

    fn replace_listings(
        &self,
        variant_id: i64,
        source: SourceKind,
        listings: &[NewListing],
    ) -> Result<ReplaceStats> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = format_timestamp(&Utc::now());
        let mut stats = ReplaceStats::default();

        let existing: HashSet<String> = {
            let mut stmt = tx.prepare(
                "SELECT external_id FROM listings WHERE variant_id = ?1 AND source = ?2",
            )?;
            let ids = stmt
                .query_map(params![variant_id, source.as_str()], |row| row.get(0))?
                .collect::<rusqlite::Result<HashSet<String>>>()?;
            ids
        };

        {
            let mut upsert = tx.prepare(
                r#"
                    INSERT INTO listings (
                        variant_id, source, external_id, title, price, currency,
                        condition, status, url, is_good_deal, last_updated
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, ?9, ?10)
                    ON CONFLICT(variant_id, source, external_id) DO UPDATE SET
                        title = excluded.title,
                        price = excluded.price,
                        currency = excluded.currency,
                        condition = excluded.condition,
                        status = 'active',
                        url = excluded.url,
                        is_good_deal = excluded.is_good_deal,
                        last_updated = excluded.last_updated
                    "#,
            )?;

            for listing in listings {
                upsert.execute(params![
                    variant_id,
                    source.as_str(),
                    listing.external_id,
                    listing.title,
                    listing.price,
                    listing.currency,
                    listing.condition.as_str(),
                    listing.url,
                    listing.is_good_deal,
                    now,
                ])?;
                if existing.contains(&listing.external_id) {
                    stats.updated += 1;
                } else {
                    stats.inserted += 1;
                }
            }
        }

        let current: HashSet<&str> = listings.iter().map(|l| l.external_id.as_str()).collect();
        {
            let mut delete = tx.prepare(
                "DELETE FROM listings WHERE variant_id = ?1 AND source = ?2 AND external_id = ?3",
            )?;
            for stale in existing.iter().filter(|id| !current.contains(id.as_str())) {
                stats.removed += delete.execute(params![variant_id, source.as_str(), stale])?;
            }
        }

        tx.commit().context("Failed to commit listings")?;
        Ok(stats)
    }

    fn listings_for(&self, variant_id: i64) -> Result<Vec<Listing>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE variant_id = ?1
             ORDER BY source, external_id"
        ))?;
        let listings = stmt
            .query_map(params![variant_id], listing_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(listings)
    }

    fn record_acquisition(
        &self,
        variant_id: i64,
        at: DateTime<Utc>,
        prices: Option<&Prices>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = match prices {
            Some(p) => conn.execute(
                "UPDATE variants SET last_acquired_at = ?1,
                     loose_price = ?2, cib_price = ?3, new_price = ?4,
                     box_only_price = ?5, manual_only_price = ?6
                 WHERE id = ?7",
                params![
                    format_timestamp(&at),
                    p.loose,
                    p.cib,
                    p.new,
                    p.box_only,
                    p.manual_only,
                    variant_id
                ],
            )?,
            None => conn.execute(
                "UPDATE variants SET last_acquired_at = ?1 WHERE id = ?2",
                params![format_timestamp(&at), variant_id],
            )?,
        };

        if updated == 0 {
            bail!("Variant {variant_id} not found");
        }
        Ok(())
    }
}

// ============================================================================
// Mock Implementation (for testing)
// ============================================================================

#[derive(Default)]
struct MockState {
    variants: BTreeMap<i64, Variant>,
    entities: BTreeMap<i64, CanonicalEntity>,
    listings: Vec<Listing>,
    next_variant_id: i64,
    next_entity_id: i64,
    next_listing_id: i64,
}

/// In-memory implementation of `Repository`
///
/// Useful for testing without database dependencies.
pub struct MockRepository {
    state: RwLock<MockState>,
}

impl MockRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MockState::default()),
        }
    }

    /// Total number of stored listings
    pub fn listing_count(&self) -> usize {
        self.state.read().map(|s| s.listings.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MockState>> {
        self.state
            .read()
            .map_err(|_| anyhow!("mock repository lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MockState>> {
        self.state
            .write()
            .map_err(|_| anyhow!("mock repository lock poisoned"))
    }
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository for MockRepository {
    fn insert_variant(&self, variant: &NewVariant) -> Result<i64> {
        let mut state = self.write()?;
        if let Some(ext) = &variant.external_id {
            if state
                .variants
                .values()
                .any(|v| v.external_id.as_ref() == Some(ext))
            {
                bail!("Failed to insert variant: duplicate external id {ext}");
            }
        }

        state.next_variant_id += 1;
        let id = state.next_variant_id;
        state.variants.insert(
            id,
            Variant {
                id,
                external_id: variant.external_id.clone(),
                console_name: variant.console_name.clone(),
                product_name: variant.product_name.clone(),
                category: variant.category.clone(),
                prices: variant.prices,
                region_tag: RegionTag::Standard,
                asin: variant.asin.clone(),
                ean: variant.ean.clone(),
                gtin: variant.gtin.clone(),
                metadata: variant.metadata.clone(),
                entity_id: None,
                last_acquired_at: None,
            },
        );
        Ok(id)
    }

    fn get_variant(&self, id: i64) -> Result<Option<Variant>> {
        Ok(self.read()?.variants.get(&id).cloned())
    }

    fn unresolved_variants(&self) -> Result<Vec<Variant>> {
        Ok(self
            .read()?
            .variants
            .values()
            .filter(|v| v.entity_id.is_none())
            .cloned()
            .collect())
    }

    fn variants_for_entity(&self, entity_id: i64) -> Result<Vec<Variant>> {
        Ok(self
            .read()?
            .variants
            .values()
            .filter(|v| v.entity_id == Some(entity_id))
            .cloned()
            .collect())
    }

    fn find_entity_by_slug(&self, slug: &str) -> Result<Option<CanonicalEntity>> {
        Ok(self
            .read()?
            .entities
            .values()
            .find(|e| e.slug == slug)
            .cloned())
    }

    fn create_entity(&self, entity: &NewEntity) -> Result<CanonicalEntity> {
        let mut state = self.write()?;
        if state.entities.values().any(|e| e.slug == entity.slug) {
            bail!("Failed to create entity with slug {}: slug taken", entity.slug);
        }

        state.next_entity_id += 1;
        let created = CanonicalEntity {
            id: state.next_entity_id,
            console_family: entity.console_family.clone(),
            title: entity.title.clone(),
            slug: entity.slug.clone(),
            match_key: entity.match_key.clone(),
            metadata: entity.metadata.clone(),
        };
        state.entities.insert(created.id, created.clone());
        Ok(created)
    }

    fn list_entities(&self) -> Result<Vec<CanonicalEntity>> {
        Ok(self.read()?.entities.values().cloned().collect())
    }

    fn link_variants(&self, entity_id: i64, links: &[(i64, RegionTag)]) -> Result<usize> {
        let mut state = self.write()?;
        let mut linked = 0;
        for (variant_id, tag) in links {
            if let Some(variant) = state.variants.get_mut(variant_id) {
                if variant.entity_id.is_none() {
                    variant.entity_id = Some(entity_id);
                    variant.region_tag = *tag;
                    linked += 1;
                }
            }
        }
        Ok(linked)
    }

    fn reset_identities(&self) -> Result<usize> {
        let mut state = self.write()?;
        for variant in state.variants.values_mut() {
            variant.entity_id = None;
        }
        let removed = state.entities.len();
        state.entities.clear();
        Ok(removed)
    }

    fn select_batch(
        &self,
        region: Region,
        include_standard: bool,
        limit: usize,
    ) -> Result<Vec<Variant>> {
        let state = self.read()?;
        let mut batch: Vec<Variant> = state
            .variants
            .values()
            .filter(|v| {
                v.region_tag.region() == Some(region)
                    || (include_standard && v.region_tag == RegionTag::Standard)
            })
            .cloned()
            .collect();
        // never-acquired first, then oldest acquisition, then id
        batch.sort_by_key(|v| (v.last_acquired_at.is_some(), v.last_acquired_at, v.id));
        batch.truncate(limit);
        Ok(batch)
    }

    fn replace_listings(
        &self,
        variant_id: i64,
        source: SourceKind,
        listings: &[NewListing],
    ) -> Result<ReplaceStats> {
        let mut state = self.write()?;
        let now = Utc::now();
        let mut stats = ReplaceStats::default();

        for new in listings {
            let existing = state.listings.iter_mut().find(|l| {
                l.variant_id == variant_id && l.source == source && l.external_id == new.external_id
            });
            match existing {
                Some(listing) => {
                    listing.title = new.title.clone();
                    listing.price = new.price;
                    listing.currency = new.currency.clone();
                    listing.condition = new.condition;
                    listing.status = ListingStatus::Active;
                    listing.url = new.url.clone();
                    listing.is_good_deal = new.is_good_deal;
                    listing.last_updated = now;
                    stats.updated += 1;
                }
                None => {
                    state.next_listing_id += 1;
                    let id = state.next_listing_id;
                    state.listings.push(Listing {
                        id,
                        variant_id,
                        source,
                        external_id: new.external_id.clone(),
                        title: new.title.clone(),
                        price: new.price,
                        currency: new.currency.clone(),
                        condition: new.condition,
                        status: ListingStatus::Active,
                        url: new.url.clone(),
                        is_good_deal: new.is_good_deal,
                        last_updated: now,
                    });
                    stats.inserted += 1;
                }
            }
        }

        let current: HashSet<&str> = listings.iter().map(|l| l.external_id.as_str()).collect();
        let before = state.listings.len();
        state.listings.retain(|l| {
            l.variant_id != variant_id
                || l.source != source
                || current.contains(l.external_id.as_str())
        });
        stats.removed = before - state.listings.len();

        Ok(stats)
    }

    fn listings_for(&self, variant_id: i64) -> Result<Vec<Listing>> {
        let mut listings: Vec<Listing> = self
            .read()?
            .listings
            .iter()
            .filter(|l| l.variant_id == variant_id)
            .cloned()
            .collect();
        listings.sort_by(|a, b| {
            (a.source.as_str(), &a.external_id).cmp(&(b.source.as_str(), &b.external_id))
        });
        Ok(listings)
    }

    fn record_acquisition(
        &self,
        variant_id: i64,
        at: DateTime<Utc>,
        prices: Option<&Prices>,
    ) -> Result<()> {
        let mut state = self.write()?;
        let variant = state
            .variants
            .get_mut(&variant_id)
            .ok_or_else(|| anyhow!("Variant {variant_id} not found"))?;
        variant.last_acquired_at = Some(at);
        if let Some(p) = prices {
            variant.prices = *p;
        }
        Ok(())
    }
}

// ============================================================================
// Shared Repository Types
// ============================================================================

/// Thread-safe shared repository wrapper
pub type SharedRepository = Arc<dyn Repository>;

/// Create a shared SQLite repository
pub fn create_sqlite_repository(path: impl AsRef<Path>) -> Result<SharedRepository> {
    let repo = SqliteRepository::new(path)?;
    Ok(Arc::new(repo))
}

/// Create a shared mock repository
pub fn create_mock_repository() -> SharedRepository {
    Arc::new(MockRepository::new())
}

// ============================================================================
// Tests
// ============================================================================
