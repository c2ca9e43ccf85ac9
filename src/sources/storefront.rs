//! HTML storefront source
//!
//! Scrapes the search results page of one storefront domain per request:
//! - browser-like headers with rotating User-Agent and regional locale
//! - shared rate limiting with governor
//! - bot-challenge and non-200 responses reported as errors, never panics
//! - bounded parallel batches for multi-domain probes

use std::num::NonZeroU32;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use lazy_static::lazy_static;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::headers::{build_storefront_headers, random_user_agent};
use super::{ListingSource, SearchRequest};
use crate::config::StorefrontConfig;
use crate::models::{ListingCandidate, Origin, SourceKind};
use crate::utils::error::FetchError;
use crate::utils::{extract_domain, normalize_whitespace};

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    static ref RESULT_ROW: Selector =
        parse_selector!("div[data-component-type='s-search-result'][data-asin]");

    static ref ROW_TITLE: Vec<Selector> = vec![
        parse_selector!("h2 a span"),
        parse_selector!("h2 span"),
        parse_selector!("[data-cy='title-recipe'] span"),
    ];

    static ref ROW_PRICE: Vec<Selector> = vec![
        parse_selector!("span.a-price:not(.a-text-price) span.a-offscreen"),
        parse_selector!("span.a-price span.a-offscreen"),
        parse_selector!("span.a-color-price"),
    ];

    static ref ROW_LINK: Vec<Selector> = vec![
        parse_selector!("h2 a[href]"),
        parse_selector!("a.a-link-normal[href]"),
    ];

    static ref ROW_IMAGE: Selector = parse_selector!("img.s-image");

    static ref CAPTCHA_FORM: Selector =
        parse_selector!("form[action*='validateCaptcha'], input#captchacharacters");
}

/// Markers of an anti-bot interstitial served with a 200
const CHALLENGE_MARKERS: &[&str] = &[
    "/errors/validatecaptcha",
    "robot check",
    "enter the characters you see below",
    "saisissez les caractères",
    "api-services-support@amazon.com",
];

/// HTML storefront scraper
pub struct StorefrontSource {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    result_limit: usize,
    pool_size: usize,

    /// Optional base URL override for testing with mock servers
    base_url: Option<String>,
}

impl StorefrontSource {
    /// Create a new storefront source
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &StorefrontConfig, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            result_limit: config.result_limit.max(1),
            pool_size: config.scrape_pool_size.max(1),
            base_url: None,
        })
    }

    /// Send every request to `base_url` instead of the storefront domain
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    fn search_url(&self, domain: &str, query: &str) -> Result<Url, FetchError> {
        let base = match &self.base_url {
            Some(base) => base.clone(),
            None => format!("https://{domain}"),
        };
        Url::parse_with_params(&format!("{base}/s"), &[("k", query)])
            .map_err(|e| FetchError::InvalidUrl(format!("{base}: {e}")))
    }

    /// Fetch and parse the search page of one domain
    pub async fn scrape(
        &self,
        domain: &str,
        query: &str,
        accept_language: &str,
        limit: usize,
    ) -> Result<Vec<ListingCandidate>, FetchError> {
        self.rate_limiter.until_ready().await;

        let url = self.search_url(domain, query)?;
        let referer = format!("https://{domain}/");
        let headers = build_storefront_headers(random_user_agent(), &referer, accept_language);

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(FetchError::from_request)?;

        let status = response.status();
        let body = response.text().await.map_err(FetchError::from_request)?;

        if is_bot_challenge(&body) {
            return Err(FetchError::BotChallenge(domain.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::ServerError(status.as_u16()));
        }

        let candidates = parse_results(&body, domain, limit.min(self.result_limit));
        debug!(
            domain = domain,
            query = query,
            results = candidates.len(),
            "Storefront search complete"
        );
        Ok(candidates)
    }

    /// Scrape several domains with at most `scrape_pool_size` requests in
    /// flight. Results come back per domain in completion order.
    pub async fn scrape_batch(
        &self,
        domains: &[String],
        query: &str,
        accept_language: &str,
    ) -> Vec<(String, Result<Vec<ListingCandidate>, FetchError>)> {
        stream::iter(domains.iter().cloned())
            .map(|domain| async move {
                let result = self
                    .scrape(&domain, query, accept_language, self.result_limit)
                    .await;
                if let Err(e) = &result {
                    warn!(domain = %domain, error = %e, "Storefront scrape failed");
                }
                (domain, result)
            })
            .buffer_unordered(self.pool_size)
            .collect()
            .await
    }
}

#[async_trait::async_trait]
impl ListingSource for StorefrontSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Storefront
    }

    async fn search(
        &self,
        request: &SearchRequest<'_>,
    ) -> Result<Vec<ListingCandidate>, FetchError> {
        let domain = request
            .domain
            .ok_or_else(|| FetchError::InvalidUrl("storefront search without a domain".into()))?;

        self.scrape(
            domain,
            request.query,
            request.marketplace.accept_language,
            request.limit,
        )
        .await
    }
}

/// True when the page is an anti-bot interstitial rather than results
pub fn is_bot_challenge(body: &str) -> bool {
    let lower = body.to_lowercase();
    if CHALLENGE_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    Html::parse_document(body)
        .select(&CAPTCHA_FORM)
        .next()
        .is_some()
}

fn first_text(row: &ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        row.select(selector)
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .find(|text| !text.is_empty())
    })
}

fn first_attr(row: &ElementRef<'_>, selectors: &[Selector], attr: &str) -> Option<String> {
    selectors.iter().find_map(|selector| {
        row.select(selector)
            .find_map(|el| el.value().attr(attr).map(str::to_string))
    })
}

/// Parse the top `limit` result rows of a search page
pub fn parse_results(html: &str, domain: &str, limit: usize) -> Vec<ListingCandidate> {
    let document = Html::parse_document(html);
    let fallback_currency = currency_for_domain(domain);
    let page_base = Url::parse(&format!("https://{domain}/")).ok();

    document
        .select(&RESULT_ROW)
        .filter_map(|row| {
            let external_id = row.value().attr("data-asin")?.trim().to_string();
            if external_id.is_empty() {
                return None;
            }

            let title = first_text(&row, &ROW_TITLE)?;
            let price_text = first_text(&row, &ROW_PRICE)?;
            let Some((price, currency)) = parse_price(&price_text) else {
                debug!(asin = %external_id, price = %price_text, "Skipping unparseable price");
                return None;
            };

            let url = first_attr(&row, &ROW_LINK, "href").and_then(|href| match &page_base {
                Some(base) => base.join(&href).ok().map(|u| u.to_string()),
                None => Url::parse(&href).ok().map(|u| u.to_string()),
            });
            let origin_host = url
                .as_deref()
                .and_then(extract_domain)
                .unwrap_or_else(|| domain.to_lowercase());

            let image_url = row
                .select(&ROW_IMAGE)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(str::to_string);

            Some(ListingCandidate {
                source: SourceKind::Storefront,
                external_id,
                title,
                price,
                currency: currency.unwrap_or(fallback_currency).to_string(),
                url,
                image_url,
                origin: Origin::Domain(origin_host),
                condition_hint: None,
            })
        })
        .take(limit)
        .collect()
}

/// Default currency of a storefront domain
pub fn currency_for_domain(domain: &str) -> &'static str {
    let domain = domain.to_lowercase();
    if domain.ends_with(".co.jp") || domain.ends_with(".jp") {
        "JPY"
    } else if domain.ends_with(".co.uk") || domain.ends_with(".uk") {
        "GBP"
    } else if domain.ends_with(".ca") {
        "CAD"
    } else if domain.ends_with(".com") {
        "USD"
    } else {
        "EUR"
    }
}

/// Parse a displayed price such as `24,99 €`, `$1,234.50` or `￥3,480`.
///
/// Returns the amount and the currency when a symbol or code is present.
pub fn parse_price(text: &str) -> Option<(f64, Option<&'static str>)> {
    let currency = detect_currency(text);

    let numeric: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    let numeric = numeric.trim_matches(|c| c == ',' || c == '.');
    if numeric.is_empty() {
        return None;
    }

    let last_comma = numeric.rfind(',');
    let last_dot = numeric.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => numeric.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => numeric.replace(',', ""),
        (Some(c), None) => {
            if numeric.len() - c - 1 == 3 {
                numeric.replace(',', "")
            } else {
                numeric.replace(',', ".")
            }
        }
        (None, Some(d)) => {
            // "1.234 €" groups thousands with dots
            let grouped = numeric.len() - d - 1 == 3 && currency == Some("EUR");
            if grouped || numeric.matches('.').count() > 1 {
                numeric.replace('.', "")
            } else {
                numeric.to_string()
            }
        }
        (None, None) => numeric.to_string(),
    };

    let value: f64 = normalized.parse().ok()?;
    (value.is_finite() && value > 0.0).then_some((value, currency))
}

fn detect_currency(text: &str) -> Option<&'static str> {
    let upper = text.to_uppercase();
    if upper.contains('€') || upper.contains("EUR") {
        Some("EUR")
    } else if upper.contains('£') || upper.contains("GBP") {
        Some("GBP")
    } else if ['¥', '￥', '円'].iter().any(|c| upper.contains(*c)) || upper.contains("JPY") {
        Some("JPY")
    } else if upper.contains("CDN$") || upper.contains("CA$") || upper.contains("CAD") {
        Some("CAD")
    } else if upper.contains('$') || upper.contains("USD") {
        Some("USD")
    } else {
        None
    }
}
