//! Per-category acquisition strategies
//!
//! A strategy builds the marketplace query for a variant, fetches candidates
//! from each applicable source and runs them through the filter pipeline:
//!
//! 1. region compatibility
//! 2. category forbidden keywords
//! 3. junk terms
//! 4. relevance against the cleaned product name
//! 5. price sanity (console hardware only)
//!
//! Accepted candidates become [`NewListing`]s with condition and deal flag set.

use std::fmt;

use tracing::debug;

use crate::classify::{
    candidate_region, clean_search_query, contains_word, detect_condition, is_junk, is_relevant,
    MarketplaceConfig,
};
use crate::models::{
    Condition, ListingCandidate, NewListing, ProductCategory, Region, SourceKind, Variant,
};
use crate::sources::{SearchRequest, SourceSet};
use crate::utils::error::FetchError;

/// Auction category ids
const GAME_CATEGORY_ID: u32 = 139973;
const HARDWARE_CATEGORY_ID: u32 = 139971;
const ACCESSORY_CATEGORY_ID: u32 = 54968;

/// Hardware listings below this share of the loose price are parts or scams
const HARDWARE_PRICE_FLOOR: f64 = 0.3;

const HARDWARE_FORBIDDEN: &[&str] = &[
    "controller",
    "manette",
    "cable",
    "câble",
    "adapter",
    "adaptateur",
    "charger",
    "chargeur",
    "for parts",
    "pour pièces",
    "pour pieces",
    "disc only",
    "game only",
    "jeu seul",
    "memory card",
    "carte mémoire",
    "stylus",
];

const GAME_FORBIDDEN: &[&str] = &["lot", "bundle", "console", "pack"];

/// Why a candidate was dropped
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    RegionMismatch { found: Region, expected: Region },
    Forbidden(&'static str),
    Junk,
    Irrelevant,
    PriceTooLow { price: f64, floor: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegionMismatch { found, expected } => {
                write!(f, "region mismatch: found {found}, expected {expected}")
            }
            Self::Forbidden(term) => write!(f, "forbidden keyword: {term}"),
            Self::Junk => f.write_str("junk listing"),
            Self::Irrelevant => f.write_str("not relevant to product"),
            Self::PriceTooLow { price, floor } => {
                write!(f, "price {price:.2} below sanity floor {floor:.2}")
            }
        }
    }
}

/// Candidates split by the filter pipeline
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub accepted: Vec<NewListing>,
    pub rejected: Vec<(String, Rejection)>,
}

/// Where a search is issued from
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub region: Region,
    pub marketplace: &'static MarketplaceConfig,
    /// Storefront domain picked for this variant
    pub domain: Option<&'a str>,
    pub limit: usize,
}

/// One source's contribution to an acquisition pass
#[derive(Debug)]
pub struct SourceResult {
    pub kind: SourceKind,
    pub outcome: Result<FilterOutcome, FetchError>,
}

/// Acquisition policy, selected from the variant's category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Game,
    ConsoleHardware,
    Accessory,
}

impl Strategy {
    pub fn for_category(category: ProductCategory) -> Self {
        match category {
            ProductCategory::Game => Self::Game,
            ProductCategory::ConsoleHardware => Self::ConsoleHardware,
            ProductCategory::Accessory => Self::Accessory,
        }
    }

    /// Unclassified variants use the game strategy
    pub fn for_variant(variant: &Variant) -> Self {
        Self::for_category(variant.product_category())
    }

    pub fn category_id(&self) -> u32 {
        match self {
            Self::Game => GAME_CATEGORY_ID,
            Self::ConsoleHardware => HARDWARE_CATEGORY_ID,
            Self::Accessory => ACCESSORY_CATEGORY_ID,
        }
    }

    /// Accessories are searched on the marketplaces only
    pub fn uses_source(&self, kind: SourceKind) -> bool {
        !(matches!(self, Self::Accessory) && kind == SourceKind::Storefront)
    }

    pub fn build_query(&self, variant: &Variant) -> String {
        let query = clean_search_query(&variant.product_name, &variant.console_name);
        match self {
            Self::ConsoleHardware if !contains_word(&query.to_lowercase(), "console") => {
                format!("{query} console")
            }
            _ => query,
        }
    }

    /// Term every accepted title must contain
    pub fn relevance_term(variant: &Variant) -> String {
        clean_search_query(&variant.product_name, "")
    }

    fn forbidden_terms(&self) -> &'static [&'static str] {
        match self {
            Self::Game => GAME_FORBIDDEN,
            Self::ConsoleHardware => HARDWARE_FORBIDDEN,
            Self::Accessory => &[],
        }
    }

    /// Share of the reference price under which a listing is a good deal
    pub fn deal_threshold(&self, condition: Condition) -> f64 {
        match (self, condition) {
            (Self::ConsoleHardware, Condition::New) => 0.9,
            (Self::ConsoleHardware, Condition::BoxOnly | Condition::ManualOnly) => 0.8,
            (Self::ConsoleHardware, _) => 0.85,
            (Self::Game, Condition::Loose) => 0.75,
            (Self::Game, Condition::Cib) => 0.8,
            (Self::Game, Condition::New) => 0.85,
            (Self::Game, _) => 0.7,
            (Self::Accessory, Condition::New) => 0.8,
            (Self::Accessory, _) => 0.7,
        }
    }

    pub fn is_good_deal(&self, variant: &Variant, condition: Condition, price: f64) -> bool {
        let threshold = self.deal_threshold(condition);
        variant
            .prices
            .get(condition)
            .is_some_and(|reference| reference > 0.0 && price < reference * threshold)
    }

    /// Run one candidate through the filter pipeline
    pub fn evaluate(
        &self,
        variant: &Variant,
        candidate: &ListingCandidate,
        target_region: Region,
    ) -> Result<NewListing, Rejection> {
        let found = candidate_region(&candidate.title, target_region);
        if found != target_region {
            return Err(Rejection::RegionMismatch {
                found,
                expected: target_region,
            });
        }

        let title = candidate.title.to_lowercase();
        let product = variant.product_name.to_lowercase();
        if let Some(term) = self
            .forbidden_terms()
            .iter()
            .find(|term| !product.contains(**term) && contains_word(&title, term))
        {
            return Err(Rejection::Forbidden(term));
        }

        if is_junk(
            &candidate.title,
            &variant.product_name,
            &variant.console_name,
            variant.product_category(),
        ) {
            return Err(Rejection::Junk);
        }

        if !is_relevant(&candidate.title, &Self::relevance_term(variant)) {
            return Err(Rejection::Irrelevant);
        }

        let condition = condition_for(candidate);

        if *self == Self::ConsoleHardware && !condition.is_partial() {
            if let Some(loose) = variant.prices.loose.filter(|p| *p > 0.0) {
                let floor = loose * HARDWARE_PRICE_FLOOR;
                if candidate.price < floor {
                    return Err(Rejection::PriceTooLow {
                        price: candidate.price,
                        floor,
                    });
                }
            }
        }

        Ok(NewListing {
            external_id: candidate.external_id.clone(),
            title: candidate.title.clone(),
            price: candidate.price,
            currency: candidate.currency.clone(),
            condition,
            url: candidate.url.clone(),
            origin: candidate.origin.clone(),
            is_good_deal: self.is_good_deal(variant, condition, candidate.price),
        })
    }

    pub fn filter(
        &self,
        variant: &Variant,
        candidates: &[ListingCandidate],
        target_region: Region,
    ) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for candidate in candidates {
            match self.evaluate(variant, candidate, target_region) {
                Ok(listing) => outcome.accepted.push(listing),
                Err(reason) => {
                    debug!(
                        variant_id = variant.id,
                        external_id = %candidate.external_id,
                        reason = %reason,
                        "Candidate rejected"
                    );
                    outcome.rejected.push((candidate.external_id.clone(), reason));
                }
            }
        }
        outcome
    }

    /// Query every applicable source once and filter what comes back.
    /// Sources with no endpoint in the worker's region are not queried.
    ///
    /// Source failures are kept per source so the caller can skip the stale
    /// sweep for sources that returned no data.
    pub async fn collect(
        &self,
        variant: &Variant,
        sources: &SourceSet,
        ctx: &SearchContext<'_>,
    ) -> Vec<SourceResult> {
        let query = self.build_query(variant);
        let request = SearchRequest {
            query: &query,
            limit: ctx.limit,
            category_id: Some(self.category_id()),
            region: ctx.region,
            marketplace: ctx.marketplace,
            domain: ctx.domain,
        };

        let mut results = Vec::new();
        let applicable = sources
            .iter()
            .filter(|s| self.uses_source(s.kind()) && ctx.marketplace.offers(s.kind()));
        for source in applicable {
            let outcome = source
                .search(&request)
                .await
                .map(|candidates| self.filter(variant, &candidates, ctx.region));
            results.push(SourceResult {
                kind: source.kind(),
                outcome,
            });
        }
        results
    }
}

/// Condition from the title, upgraded to NEW when the source says so
fn condition_for(candidate: &ListingCandidate) -> Condition {
    let from_title = detect_condition(&candidate.title);
    let hinted_new = candidate.condition_hint.as_deref().is_some_and(|hint| {
        let hint = hint.to_lowercase();
        matches!(hint.as_str(), "new" | "neuf")
            || hint.starts_with("brand new")
            || hint.starts_with("neuf avec")
    });

    if from_title == Condition::Loose && hinted_new {
        Condition::New
    } else {
        from_title
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Origin, Prices, RegionTag};

    fn variant(product: &str, console: &str, category: Option<&str>) -> Variant {
        Variant {
            id: 1,
            external_id: None,
            console_name: console.to_string(),
            product_name: product.to_string(),
            category: category.map(str::to_string),
            prices: Prices {
                loose: Some(100.0),
                cib: Some(200.0),
                ..Default::default()
            },
            region_tag: RegionTag::Pal,
            asin: None,
            ean: None,
            gtin: None,
            metadata: Default::default(),
            entity_id: Some(1),
            last_acquired_at: None,
        }
    }

    fn candidate(title: &str, price: f64) -> ListingCandidate {
        ListingCandidate {
            source: SourceKind::Auction,
            external_id: "item-1".to_string(),
            title: title.to_string(),
            price,
            currency: "EUR".to_string(),
            url: None,
            image_url: None,
            origin: Origin::Marketplace("EBAY_FR".to_string()),
            condition_hint: None,
        }
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            Strategy::for_variant(&variant("Mario", "N64", None)),
            Strategy::Game
        );
        assert_eq!(
            Strategy::for_variant(&variant("N64", "N64", Some("console"))),
            Strategy::ConsoleHardware
        );
        assert_eq!(
            Strategy::for_variant(&variant("Pad", "N64", Some("accessories"))),
            Strategy::Accessory
        );
    }

    #[test]
    fn test_hardware_query_appends_console() {
        let v = variant("Nintendo 64 (PAL)", "PAL Nintendo 64", Some("console"));
        assert_eq!(
            Strategy::ConsoleHardware.build_query(&v),
            "Nintendo 64 Nintendo 64 console"
        );

        let v = variant("Console Nintendo 64", "Nintendo 64", Some("console"));
        assert_eq!(
            Strategy::ConsoleHardware.build_query(&v),
            "Console Nintendo 64 Nintendo 64"
        );
    }

    #[test]
    fn test_accessory_skips_storefront() {
        assert!(!Strategy::Accessory.uses_source(SourceKind::Storefront));
        assert!(Strategy::Accessory.uses_source(SourceKind::Auction));
        assert!(Strategy::Game.uses_source(SourceKind::Storefront));
    }

    #[test]
    fn test_region_mismatch_rejected() {
        let v = variant("Super Mario 64", "PAL Nintendo 64", None);
        let result = Strategy::Game.evaluate(&v, &candidate("Super Mario 64 N64 NTSC USA", 30.0), Region::Pal);
        assert_eq!(
            result,
            Err(Rejection::RegionMismatch {
                found: Region::Ntsc,
                expected: Region::Pal
            })
        );
    }

    #[test]
    fn test_game_rejects_lots_unless_named() {
        let v = variant("Super Mario 64", "PAL Nintendo 64", None);
        assert_eq!(
            Strategy::Game.evaluate(&v, &candidate("Lot Super Mario 64 + Mario Kart", 50.0), Region::Pal),
            Err(Rejection::Forbidden("lot"))
        );

        let bundle = variant("Nintendo 64 Console Bundle", "PAL Nintendo 64", None);
        assert!(Strategy::Game
            .evaluate(&bundle, &candidate("Nintendo 64 Console Bundle PAL", 150.0), Region::Pal)
            .is_ok());
    }

    #[test]
    fn test_hardware_forbidden_and_price_sanity() {
        let v = variant("Nintendo 64", "PAL Nintendo 64", Some("console"));
        assert_eq!(
            Strategy::ConsoleHardware.evaluate(&v, &candidate("Manette Nintendo 64", 20.0), Region::Pal),
            Err(Rejection::Forbidden("manette"))
        );
        assert!(matches!(
            Strategy::ConsoleHardware.evaluate(&v, &candidate("Nintendo 64 console", 10.0), Region::Pal),
            Err(Rejection::PriceTooLow { .. })
        ));
        // Partial items are allowed below the floor
        assert!(Strategy::ConsoleHardware
            .evaluate(&v, &candidate("Nintendo 64 boite seule", 10.0), Region::Pal)
            .is_ok());
    }

    #[test]
    fn test_junk_and_relevance() {
        let v = variant("Super Mario 64", "PAL Nintendo 64", None);
        assert_eq!(
            Strategy::Game.evaluate(&v, &candidate("Super Mario 64 poster", 5.0), Region::Pal),
            Err(Rejection::Junk)
        );
        assert_eq!(
            Strategy::Game.evaluate(&v, &candidate("Mario Kart 64 PAL", 25.0), Region::Pal),
            Err(Rejection::Irrelevant)
        );
    }

    #[test]
    fn test_deal_detection() {
        let v = variant("Super Mario 64", "PAL Nintendo 64", None);
        let cheap = Strategy::Game
            .evaluate(&v, &candidate("Super Mario 64 PAL", 70.0), Region::Pal)
            .unwrap();
        assert_eq!(cheap.condition, Condition::Loose);
        assert!(cheap.is_good_deal);

        let fair = Strategy::Game
            .evaluate(&v, &candidate("Super Mario 64 PAL", 80.0), Region::Pal)
            .unwrap();
        assert!(!fair.is_good_deal);

        let cib = Strategy::Game
            .evaluate(&v, &candidate("Super Mario 64 complet PAL", 150.0), Region::Pal)
            .unwrap();
        assert_eq!(cib.condition, Condition::Cib);
        assert!(cib.is_good_deal);

        // No reference price, no deal
        let sealed = Strategy::Game
            .evaluate(&v, &candidate("Super Mario 64 sealed", 10.0), Region::Pal)
            .unwrap();
        assert!(!sealed.is_good_deal);
    }

    #[test]
    fn test_hardware_threshold_is_stricter() {
        assert!(
            Strategy::ConsoleHardware.deal_threshold(Condition::Loose)
                > Strategy::Game.deal_threshold(Condition::Loose)
        );
    }

    #[test]
    fn test_condition_hint_upgrades_to_new() {
        let mut c = candidate("Super Mario 64", 10.0);
        c.condition_hint = Some("New".to_string());
        assert_eq!(condition_for(&c), Condition::New);

        c.condition_hint = Some("Used".to_string());
        assert_eq!(condition_for(&c), Condition::Loose);
    }

    #[test]
    fn test_filter_splits_candidates() {
        let v = variant("Super Mario 64", "PAL Nintendo 64", None);
        let mut second = candidate("Super Mario 64 JAP", 30.0);
        second.external_id = "item-2".to_string();
        let outcome = Strategy::Game.filter(
            &v,
            &[candidate("Super Mario 64 PAL", 30.0), second],
            Region::Pal,
        );
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].0, "item-2");
    }
}
