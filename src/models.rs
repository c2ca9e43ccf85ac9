// Core data structures for retrotrack

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Regions
// ============================================================================

/// Physical market region a storefront or marketplace serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Pal,
    Ntsc,
    Jp,
}

impl Region {
    /// All supported regions, one worker each
    pub fn all() -> [Self; 3] {
        [Self::Pal, Self::Ntsc, Self::Jp]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pal => "pal",
            Self::Ntsc => "ntsc",
            Self::Jp => "jp",
        }
    }

    /// Parse a region identifier (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pal" | "eu" | "europe" => Some(Self::Pal),
            "ntsc" | "ntsc-u" | "us" | "usa" => Some(Self::Ntsc),
            "jp" | "jpn" | "japan" | "ntsc-j" => Some(Self::Jp),
            _ => None,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown region: {s}"))
    }
}

/// Region tag stored on a variant
///
/// `Standard` means no explicit regional marker was found. Routing a
/// `Standard` variant requires the caller to pick an explicit fallback region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegionTag {
    Pal,
    Ntsc,
    Jp,
    #[default]
    Standard,
}

impl RegionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pal => "pal",
            Self::Ntsc => "ntsc",
            Self::Jp => "jp",
            Self::Standard => "standard",
        }
    }

    /// The explicit region, if any
    pub fn region(&self) -> Option<Region> {
        match self {
            Self::Pal => Some(Region::Pal),
            Self::Ntsc => Some(Region::Ntsc),
            Self::Jp => Some(Region::Jp),
            Self::Standard => None,
        }
    }

    /// Resolve to a concrete region using an explicit fallback
    pub fn region_or(&self, fallback: Region) -> Region {
        self.region().unwrap_or(fallback)
    }
}

impl From<Option<Region>> for RegionTag {
    fn from(region: Option<Region>) -> Self {
        match region {
            Some(Region::Pal) => Self::Pal,
            Some(Region::Ntsc) => Self::Ntsc,
            Some(Region::Jp) => Self::Jp,
            None => Self::Standard,
        }
    }
}

impl fmt::Display for RegionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RegionTag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Region::parse(s).map_or(Self::Standard, |r| Self::from(Some(r))))
    }
}

// ============================================================================
// Condition & Category
// ============================================================================

/// Physical condition of a sellable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Loose,
    Cib,
    New,
    BoxOnly,
    ManualOnly,
}

impl Condition {
    pub fn all() -> [Self; 5] {
        [
            Self::Loose,
            Self::Cib,
            Self::New,
            Self::BoxOnly,
            Self::ManualOnly,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loose => "loose",
            Self::Cib => "cib",
            Self::New => "new",
            Self::BoxOnly => "box_only",
            Self::ManualOnly => "manual_only",
        }
    }

    /// Partial items (box or manual without the product itself)
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::BoxOnly | Self::ManualOnly)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loose" => Ok(Self::Loose),
            "cib" => Ok(Self::Cib),
            "new" => Ok(Self::New),
            "box_only" => Ok(Self::BoxOnly),
            "manual_only" => Ok(Self::ManualOnly),
            other => Err(format!("unknown condition: {other}")),
        }
    }
}

/// Product category driving the acquisition strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Game,
    ConsoleHardware,
    Accessory,
}

impl ProductCategory {
    /// Map a free-form category attribute; unclassified variants are games
    pub fn from_attribute(attr: Option<&str>) -> Self {
        let Some(attr) = attr else {
            return Self::Game;
        };
        match attr.trim().to_lowercase().as_str() {
            "console" | "consoles" | "hardware" | "system" | "systems" | "console_hardware" => {
                Self::ConsoleHardware
            }
            "accessory" | "accessories" | "controller" | "controllers" | "peripheral" => {
                Self::Accessory
            }
            _ => Self::Game,
        }
    }
}

// ============================================================================
// Prices
// ============================================================================

/// Per-condition reference prices; each slot is optional
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Prices {
    pub loose: Option<f64>,
    pub cib: Option<f64>,
    pub new: Option<f64>,
    pub box_only: Option<f64>,
    pub manual_only: Option<f64>,
}

impl Prices {
    pub fn get(&self, condition: Condition) -> Option<f64> {
        match condition {
            Condition::Loose => self.loose,
            Condition::Cib => self.cib,
            Condition::New => self.new,
            Condition::BoxOnly => self.box_only,
            Condition::ManualOnly => self.manual_only,
        }
    }

    pub fn set(&mut self, condition: Condition, value: Option<f64>) {
        let slot = match condition {
            Condition::Loose => &mut self.loose,
            Condition::Cib => &mut self.cib,
            Condition::New => &mut self.new,
            Condition::BoxOnly => &mut self.box_only,
            Condition::ManualOnly => &mut self.manual_only,
        };
        *slot = value;
    }

    /// Fill empty slots with the median of observed prices per condition.
    ///
    /// Returns true when at least one slot changed.
    pub fn fill_from_observations(&mut self, observed: &[(Condition, f64)]) -> bool {
        let mut changed = false;
        for condition in Condition::all() {
            if self.get(condition).is_some() {
                continue;
            }
            let mut values: Vec<f64> = observed
                .iter()
                .filter(|(c, p)| *c == condition && p.is_finite() && *p > 0.0)
                .map(|(_, p)| *p)
                .collect();
            if let Some(median) = median(&mut values) {
                self.set(condition, Some(median));
                changed = true;
            }
        }
        changed
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

// ============================================================================
// Persisted entities
// ============================================================================

/// Descriptive catalog metadata carried by variants and canonical entities
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub genre: Option<String>,
    pub publisher: Option<String>,
    pub developer: Option<String>,
    pub release_date: Option<NaiveDate>,
}

/// Title-level identity that regional variants consolidate into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub id: i64,
    pub console_family: String,
    pub title: String,
    pub slug: String,
    /// Normalized grouping key the entity was created for
    pub match_key: String,
    pub metadata: Metadata,
}

/// Fields needed to create a canonical entity
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub console_family: String,
    pub title: String,
    pub slug: String,
    pub match_key: String,
    pub metadata: Metadata,
}

/// Region/source-specific sellable SKU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: i64,
    pub external_id: Option<String>,
    pub console_name: String,
    pub product_name: String,
    pub category: Option<String>,
    pub prices: Prices,
    pub region_tag: RegionTag,
    pub asin: Option<String>,
    pub ean: Option<String>,
    pub gtin: Option<String>,
    pub metadata: Metadata,
    pub entity_id: Option<i64>,
    pub last_acquired_at: Option<DateTime<Utc>>,
}

impl Variant {
    pub fn product_category(&self) -> ProductCategory {
        ProductCategory::from_attribute(self.category.as_deref())
    }
}

/// Raw variant as delivered by catalog ingestion
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewVariant {
    pub external_id: Option<String>,
    pub console_name: String,
    pub product_name: String,
    pub category: Option<String>,
    pub prices: Prices,
    pub asin: Option<String>,
    pub ean: Option<String>,
    pub gtin: Option<String>,
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl NewVariant {
    pub fn new(product_name: impl Into<String>, console_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            console_name: console_name.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Listings
// ============================================================================

/// External source a listing was observed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Auction-style marketplace API
    Auction,
    /// HTML storefront
    Storefront,
    /// Peer-to-peer marketplace
    Peer,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auction => "auction",
            Self::Storefront => "storefront",
            Self::Peer => "peer",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auction" => Ok(Self::Auction),
            "storefront" => Ok(Self::Storefront),
            "peer" => Ok(Self::Peer),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

/// Geographic origin implied by where a candidate came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Auction marketplace id (e.g. `EBAY_FR`)
    Marketplace(String),
    /// Host of the listing URL
    Domain(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marketplace(id) => write!(f, "marketplace:{id}"),
            Self::Domain(host) => write!(f, "domain:{host}"),
        }
    }
}

/// Raw market offer returned by a source, before filtering
#[derive(Debug, Clone, PartialEq)]
pub struct ListingCandidate {
    pub source: SourceKind,
    pub external_id: String,
    pub title: String,
    pub price: f64,
    pub currency: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub origin: Origin,
    pub condition_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Ended,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl FromStr for ListingStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "ended" {
            Self::Ended
        } else {
            Self::Active
        })
    }
}

/// Validated listing ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewListing {
    pub external_id: String,
    pub title: String,
    pub price: f64,
    pub currency: String,
    pub condition: Condition,
    pub url: Option<String>,
    pub origin: Origin,
    pub is_good_deal: bool,
}

/// Persisted market observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub variant_id: i64,
    pub source: SourceKind,
    pub external_id: String,
    pub title: String,
    pub price: f64,
    pub currency: String,
    pub condition: Condition,
    pub status: ListingStatus,
    pub url: Option<String>,
    pub is_good_deal: bool,
    pub last_updated: DateTime<Utc>,
}
