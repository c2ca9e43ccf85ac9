//! Region and condition classification
//!
//! Stateless heuristics over free-text titles:
//! - region detection (explicit markers, then region-exclusive hardware)
//! - condition detection with "complete" precedence
//! - junk and relevance gates for marketplace candidates
//! - storefront-agnostic search query cleaning
//! - the static region → marketplace table

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{Condition, ProductCategory, Region, SourceKind};
use crate::utils::{host_matches, normalize_whitespace};

macro_rules! parse_regex {
    ($s:expr) => {
        Regex::new($s).expect(concat!("Invalid regex: ", $s))
    };
}

lazy_static! {
    static ref JP_MARKER: Regex = parse_regex!(
        r"(?i)\b(?:ntsc-j|ntscj|jp|jpn|jap|japan|japanese|japon|japonais|japonaise|import japon)\b"
    );
    static ref PAL_MARKER: Regex = parse_regex!(
        r"(?i)\b(?:pal|pal-(?:fr|uk|eu|de|es|it)|eur|version fran[cç]aise)\b"
    );
    static ref NTSC_MARKER: Regex = parse_regex!(
        r"(?i)\b(?:ntsc|ntsc-u|ntsc-us|usa|us version|version us|version am[eé]ricaine)\b"
    );

    static ref COMPLETE_MARKER: Regex = parse_regex!(
        r"(?i)\b(?:complet|complete|compl[eè]te|cib|avec jeu|with game|en boite complet)\b"
    );
    static ref NEW_MARKER: Regex = parse_regex!(
        r"(?i)\b(?:new|sealed|neuf|brand new|factory sealed|blister|scell[eé]e?|nuevo|new in box)\b"
    );
    // "New" as part of a product or hardware name
    static ref NEW_IN_NAME: Regex = parse_regex!(
        r"(?i)\bnew\s+(?:super|nintendo|3ds|2ds|style|adventures?)\b"
    );
    static ref LIKE_NEW: Regex = parse_regex!(r"(?i)\b(?:comme neuf|like new|as new|quasi neuf)\b");
    static ref BOX_MARKER: Regex = parse_regex!(
        r"(?i)\b(?:box|boxes|boite|bo[iî]te|bo[iî]tier|case|caja|emballage|packaging)\b"
    );
    static ref MANUAL_MARKER: Regex =
        parse_regex!(r"(?i)\b(?:manual|manuel|notice|booklet|livret|instructions)\b");
    static ref ONLY_QUALIFIER: Regex = parse_regex!(
        r"(?i)\b(?:seule?s?|only|empty|vide|sans jeu|sans cartouche|no game|without game)\b"
    );

    static ref ANNOTATION: Regex = parse_regex!(r"\([^)]*\)|\[[^\]]*\]");
    static ref QUERY_REGION_TOKEN: Regex = parse_regex!(
        r"(?i)\b(?:ntsc-u|ntsc-j|ntsc|pal|jp|jpn|jap|japan|japanese|import|eur)\b"
    );
}

/// Console families historically sold in a single region
const REGION_EXCLUSIVE_HARDWARE: &[(&str, Region)] = &[
    ("famicom", Region::Jp),
    ("super famicom", Region::Jp),
    ("famicom disk system", Region::Jp),
    ("pc engine", Region::Jp),
    ("pc-engine", Region::Jp),
    ("pc-fx", Region::Jp),
    ("wonderswan", Region::Jp),
    ("satellaview", Region::Jp),
    ("64dd", Region::Jp),
    ("sega mark iii", Region::Jp),
    ("genesis", Region::Ntsc),
    ("turbografx", Region::Ntsc),
    ("turbografx-16", Region::Ntsc),
    ("sega cd", Region::Ntsc),
    ("amstrad gx4000", Region::Pal),
    ("videopac", Region::Pal),
];

/// Terms that mark a listing as something other than the product itself
const JUNK_TERMS: &[&str] = &[
    "repro",
    "reproduction",
    "artwork",
    "art only",
    "jaquette seule",
    "cover only",
    "insert only",
    "poster",
    "affiche",
    "sticker",
    "autocollant",
    "keychain",
    "porte-clé",
    "porte-cle",
    "t-shirt",
    "figurine",
    "pin's",
    "strategy guide",
    "guide officiel",
    "soluce",
    "magazine",
];

/// Junk for games and hardware, legitimate for accessories
const NON_ACCESSORY_JUNK_TERMS: &[&str] = &[
    "replacement",
    "remplacement",
    "coque",
    "shell",
    "housing",
    "protector",
    "protective",
    "protection",
];

fn explicit_marker(text: &str) -> Option<Region> {
    // JP first: "NTSC-J" also contains an NTSC word boundary
    if JP_MARKER.is_match(text) {
        Some(Region::Jp)
    } else if PAL_MARKER.is_match(text) {
        Some(Region::Pal)
    } else if NTSC_MARKER.is_match(text) {
        Some(Region::Ntsc)
    } else {
        None
    }
}

/// Whole-word containment; `needle` must already be lower-case like `haystack`
pub(crate) fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

/// Detect the physical region of a product.
///
/// Evaluated in priority order: an explicit marker on the console name, an
/// explicit marker in the product text, then the region-exclusive hardware
/// table. Returns `None` when nothing matches; callers needing a default
/// must supply it themselves.
pub fn detect_region(console_name: &str, product_name: Option<&str>) -> Option<Region> {
    if let Some(region) = explicit_marker(console_name) {
        return Some(region);
    }
    if let Some(region) = product_name.and_then(explicit_marker) {
        return Some(region);
    }

    let console = console_name.to_lowercase();
    REGION_EXCLUSIVE_HARDWARE
        .iter()
        .find(|(keyword, _)| contains_word(&console, keyword))
        .map(|(_, region)| *region)
}

/// Region of a marketplace candidate, from its own title or the query target
pub fn candidate_region(title: &str, query_region: Region) -> Region {
    explicit_marker(title).unwrap_or(query_region)
}

/// Detect the physical condition described by a listing title.
///
/// A "complete" marker always wins and yields CIB (or NEW when also sealed),
/// whatever box/manual words appear alongside it.
pub fn detect_condition(title: &str) -> Condition {
    let is_new = NEW_MARKER.is_match(&NEW_IN_NAME.replace_all(title, " "))
        && !LIKE_NEW.is_match(title);

    if COMPLETE_MARKER.is_match(title) {
        return if is_new { Condition::New } else { Condition::Cib };
    }

    let only = ONLY_QUALIFIER.is_match(title);
    if only && BOX_MARKER.is_match(title) {
        return Condition::BoxOnly;
    }
    if only && MANUAL_MARKER.is_match(title) {
        return Condition::ManualOnly;
    }
    if is_new {
        return Condition::New;
    }

    Condition::Loose
}

/// Reject listings that are merchandise, parts or artwork rather than the
/// product. Terms also present in the product or console name are allowed.
pub fn is_junk(
    title: &str,
    product_name: &str,
    console_name: &str,
    category: ProductCategory,
) -> bool {
    let title = title.to_lowercase();
    let product = product_name.to_lowercase();
    let console = console_name.to_lowercase();

    let extra: &[&str] = if category == ProductCategory::Accessory {
        &[]
    } else {
        NON_ACCESSORY_JUNK_TERMS
    };

    JUNK_TERMS
        .iter()
        .chain(extra.iter())
        .filter(|term| !product.contains(*term) && !console.contains(*term))
        .any(|term| contains_word(&title, term))
}

/// Case-insensitive containment gate applied after source-side search
pub fn is_relevant(title: &str, keyword: &str) -> bool {
    title.to_lowercase().contains(&keyword.to_lowercase())
}

/// Build a storefront-agnostic query from a product and console name.
///
/// Bracketed annotations and region tokens are removed from both inputs
/// before they are joined.
pub fn clean_search_query(product_name: &str, console_name: &str) -> String {
    let clean = |text: &str| {
        let without_annotations = ANNOTATION.replace_all(text, " ");
        QUERY_REGION_TOKEN
            .replace_all(&without_annotations, " ")
            .into_owned()
    };

    normalize_whitespace(&format!("{} {}", clean(product_name), clean(console_name)))
}

/// Marketplace parameters for one region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketplaceConfig {
    pub region: Region,
    /// Marketplace id sent to the auction API. No auction marketplace
    /// serves every region.
    pub marketplace_id: Option<&'static str>,
    pub currency: &'static str,
    pub accept_language: &'static str,
    /// Peer marketplace domain, where one operates
    pub peer_domain: Option<&'static str>,
}

impl MarketplaceConfig {
    /// Whether the region has an endpoint for this kind of source
    pub fn offers(&self, source: SourceKind) -> bool {
        match source {
            SourceKind::Storefront => true,
            SourceKind::Auction => self.marketplace_id.is_some(),
            SourceKind::Peer => self.peer_domain.is_some(),
        }
    }
}

const MARKETPLACES: [MarketplaceConfig; 3] = [
    MarketplaceConfig {
        region: Region::Pal,
        marketplace_id: Some("EBAY_FR"),
        currency: "EUR",
        accept_language: "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7",
        peer_domain: Some("www.vinted.fr"),
    },
    MarketplaceConfig {
        region: Region::Ntsc,
        marketplace_id: Some("EBAY_US"),
        currency: "USD",
        accept_language: "en-US,en;q=0.9",
        peer_domain: None,
    },
    MarketplaceConfig {
        region: Region::Jp,
        marketplace_id: None,
        currency: "JPY",
        accept_language: "ja-JP,ja;q=0.9,en-US;q=0.8,en;q=0.7",
        peer_domain: None,
    },
];

/// Static marketplace lookup, one row per supported region
pub fn marketplace_config(region: Region) -> &'static MarketplaceConfig {
    match region {
        Region::Pal => &MARKETPLACES[0],
        Region::Ntsc => &MARKETPLACES[1],
        Region::Jp => &MARKETPLACES[2],
    }
}

/// One national site of the auction marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuctionSite {
    pub marketplace_id: &'static str,
    pub host: &'static str,
    /// Video standard of the goods the site mostly sells
    pub region: Region,
}

#[rustfmt::skip]
const AUCTION_SITES: &[AuctionSite] = &[
    AuctionSite { marketplace_id: "EBAY_FR", host: "ebay.fr", region: Region::Pal },
    AuctionSite { marketplace_id: "EBAY_DE", host: "ebay.de", region: Region::Pal },
    AuctionSite { marketplace_id: "EBAY_IT", host: "ebay.it", region: Region::Pal },
    AuctionSite { marketplace_id: "EBAY_ES", host: "ebay.es", region: Region::Pal },
    AuctionSite { marketplace_id: "EBAY_GB", host: "ebay.co.uk", region: Region::Pal },
    AuctionSite { marketplace_id: "EBAY_AT", host: "ebay.at", region: Region::Pal },
    AuctionSite { marketplace_id: "EBAY_AU", host: "ebay.com.au", region: Region::Pal },
    AuctionSite { marketplace_id: "EBAY_US", host: "ebay.com", region: Region::Ntsc },
    AuctionSite { marketplace_id: "EBAY_CA", host: "ebay.ca", region: Region::Ntsc },
];

/// Auction site serving a listing URL host (`www.ebay.de`, `ebay.com`, ...)
pub fn auction_site_for_host(host: &str) -> Option<&'static AuctionSite> {
    AUCTION_SITES
        .iter()
        .find(|site| host_matches(host, site.host))
}

pub fn auction_site(marketplace_id: &str) -> Option<&'static AuctionSite> {
    AUCTION_SITES
        .iter()
        .find(|site| site.marketplace_id.eq_ignore_ascii_case(marketplace_id))
}
