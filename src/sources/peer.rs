//! Peer-to-peer marketplace source
//!
//! The JSON search API only answers requests carrying a session cookie, so a
//! bootstrap GET of the home page primes the cookie jar first. Sessions are
//! re-bootstrapped when older than the configured TTL and once more on a 401.
//! Failures surface as a [`PeerDebug`] payload naming the failing stage.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::cookie::Jar;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::headers::{build_json_headers, build_storefront_headers, random_user_agent};
use super::{ListingSource, SearchRequest};
use crate::config::PeerConfig;
use crate::models::{ListingCandidate, Origin, SourceKind};
use crate::utils::error::{FetchError, PeerDebug, PeerStage};
use crate::utils::{extract_domain, truncate_text};

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    items: Vec<CatalogItem>,
}

#[derive(Debug, Deserialize)]
struct CatalogItem {
    id: serde_json::Value,
    title: String,
    price: PriceField,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    photo: Option<Photo>,
    #[serde(default)]
    status: Option<String>,
}

/// Price as a bare string or as an amount object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceField {
    Amount {
        amount: String,
        currency_code: Option<String>,
    },
    Plain(String),
    Number(f64),
}

#[derive(Debug, Deserialize)]
struct Photo {
    url: Option<String>,
}

/// Result of a peer search, with a debug payload on failure
#[derive(Debug, Clone, Default)]
pub struct PeerOutcome {
    pub candidates: Vec<ListingCandidate>,
    pub debug: Option<PeerDebug>,
}

impl PeerOutcome {
    fn failed(stage: PeerStage, status: Option<u16>, detail: impl Into<String>, refreshed: bool) -> Self {
        Self {
            candidates: Vec::new(),
            debug: Some(PeerDebug {
                stage,
                status,
                detail: detail.into(),
                refreshed,
            }),
        }
    }
}

enum SearchAttempt {
    Ok(Vec<ListingCandidate>),
    Unauthorized,
    Failed(PeerOutcome),
}

/// Peer marketplace client
pub struct PeerSource {
    client: Client,
    jar: Arc<Jar>,
    result_limit: usize,
    session_ttl: Duration,

    /// When the current session cookie was obtained
    session: Mutex<Option<Instant>>,

    /// Optional base URL override for testing with mock servers
    base_url: Option<String>,
}

impl PeerSource {
    /// Create a new peer marketplace client
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &PeerConfig, timeout: Duration) -> Result<Self, FetchError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_provider(jar.clone())
            .build()?;

        Ok(Self {
            client,
            jar,
            result_limit: config.result_limit.max(1),
            session_ttl: Duration::from_secs(config.session_ttl_secs),
            session: Mutex::new(None),
            base_url: None,
        })
    }

    /// Send every request to `base_url` instead of the marketplace domain
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    fn origin_url(&self, domain: &str) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{domain}"))
    }

    /// Make sure a live session cookie exists, bootstrapping when missing,
    /// expired or `force` is set
    async fn ensure_session(
        &self,
        domain: &str,
        accept_language: &str,
        force: bool,
    ) -> Result<(), PeerDebug> {
        let mut session = self.session.lock().await;

        let live = session.is_some_and(|started| started.elapsed() < self.session_ttl);
        if live && !force {
            return Ok(());
        }

        let home = format!("{}/", self.origin_url(domain));
        let headers =
            build_storefront_headers(random_user_agent(), &format!("https://{domain}/"), accept_language);

        let bootstrap_failed = |status: Option<u16>, detail: String| PeerDebug {
            stage: PeerStage::Bootstrap,
            status,
            detail,
            refreshed: force,
        };

        let response = self
            .client
            .get(&home)
            .headers(headers)
            .send()
            .await
            .map_err(|e| bootstrap_failed(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            *session = None;
            return Err(bootstrap_failed(
                Some(status.as_u16()),
                "session bootstrap rejected".to_string(),
            ));
        }

        if let Ok(url) = home.parse::<url::Url>() {
            use reqwest::cookie::CookieStore;
            if self.jar.cookies(&url).is_none() {
                debug!(domain = domain, "Bootstrap returned no session cookie");
            }
        }

        *session = Some(Instant::now());
        debug!(domain = domain, refreshed = force, "Peer session bootstrapped");
        Ok(())
    }

    async fn attempt_search(
        &self,
        domain: &str,
        query: &str,
        limit: usize,
        accept_language: &str,
        refreshed: bool,
    ) -> SearchAttempt {
        let url = format!("{}/api/v2/catalog/items", self.origin_url(domain));
        let headers =
            build_json_headers(random_user_agent(), &format!("https://{domain}/"), accept_language);
        let per_page = limit.to_string();

        let response = match self
            .client
            .get(&url)
            .headers(headers)
            .query(&[
                ("search_text", query),
                ("per_page", per_page.as_str()),
                ("order", "newest_first"),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return SearchAttempt::Failed(PeerOutcome::failed(
                    PeerStage::Search,
                    None,
                    e.to_string(),
                    refreshed,
                ))
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return SearchAttempt::Unauthorized;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return SearchAttempt::Failed(PeerOutcome::failed(
                PeerStage::Search,
                Some(status.as_u16()),
                truncate_text(&body, 200),
                refreshed,
            ));
        }

        match response.json::<CatalogResponse>().await {
            Ok(catalog) => SearchAttempt::Ok(
                catalog
                    .items
                    .into_iter()
                    .filter_map(|item| to_candidate(item, domain))
                    .take(limit)
                    .collect(),
            ),
            Err(e) => SearchAttempt::Failed(PeerOutcome::failed(
                PeerStage::Decode,
                Some(status.as_u16()),
                e.to_string(),
                refreshed,
            )),
        }
    }

    /// Search the marketplace on `domain`.
    ///
    /// Never fails outright: on persistent failure the outcome is empty and
    /// carries a debug payload.
    pub async fn search_detailed(
        &self,
        domain: &str,
        query: &str,
        limit: usize,
        accept_language: &str,
    ) -> PeerOutcome {
        let limit = limit.min(self.result_limit);

        if let Err(debug) = self.ensure_session(domain, accept_language, false).await {
            return PeerOutcome {
                candidates: Vec::new(),
                debug: Some(debug),
            };
        }

        match self
            .attempt_search(domain, query, limit, accept_language, false)
            .await
        {
            SearchAttempt::Ok(candidates) => return PeerOutcome {
                candidates,
                debug: None,
            },
            SearchAttempt::Failed(outcome) => return outcome,
            SearchAttempt::Unauthorized => {
                warn!(domain = domain, "Peer session rejected, refreshing cookies once");
            }
        }

        if let Err(debug) = self.ensure_session(domain, accept_language, true).await {
            return PeerOutcome {
                candidates: Vec::new(),
                debug: Some(debug),
            };
        }

        match self
            .attempt_search(domain, query, limit, accept_language, true)
            .await
        {
            SearchAttempt::Ok(candidates) => PeerOutcome {
                candidates,
                debug: None,
            },
            SearchAttempt::Failed(outcome) => outcome,
            SearchAttempt::Unauthorized => PeerOutcome::failed(
                PeerStage::Search,
                Some(StatusCode::UNAUTHORIZED.as_u16()),
                "unauthorized after cookie refresh",
                true,
            ),
        }
    }
}

fn to_candidate(item: CatalogItem, domain: &str) -> Option<ListingCandidate> {
    let external_id = match &item.id {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let (amount, currency) = match item.price {
        PriceField::Amount {
            amount,
            currency_code,
        } => (amount.trim().parse::<f64>().ok()?, currency_code),
        PriceField::Plain(text) => (text.trim().replace(',', ".").parse::<f64>().ok()?, None),
        PriceField::Number(value) => (value, None),
    };
    if !(amount.is_finite() && amount > 0.0) {
        return None;
    }

    let origin_host = item
        .url
        .as_deref()
        .and_then(extract_domain)
        .unwrap_or_else(|| domain.to_lowercase());

    Some(ListingCandidate {
        source: SourceKind::Peer,
        external_id,
        title: item.title,
        price: amount,
        currency: currency
            .or(item.currency)
            .unwrap_or_else(|| "EUR".to_string()),
        url: item.url,
        image_url: item.photo.and_then(|p| p.url),
        origin: Origin::Domain(origin_host),
        condition_hint: item.status,
    })
}

#[async_trait::async_trait]
impl ListingSource for PeerSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Peer
    }

    async fn search(
        &self,
        request: &SearchRequest<'_>,
    ) -> Result<Vec<ListingCandidate>, FetchError> {
        // Regions without a peer marketplace have nothing to search
        let Some(domain) = request.marketplace.peer_domain else {
            return Ok(Vec::new());
        };

        let outcome = self
            .search_detailed(
                domain,
                request.query,
                request.limit,
                request.marketplace.accept_language,
            )
            .await;

        match outcome.debug {
            Some(debug) => Err(FetchError::Peer(debug)),
            None => Ok(outcome.candidates),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_item_price_shapes() {
        let body = r#"{"items":[
            {"id": 101, "title": "Super Mario 64 N64", "price": {"amount": "25.0", "currency_code": "EUR"},
             "url": "https://www.vinted.fr/items/101-super-mario-64", "status": "Très bon état"},
            {"id": "102", "title": "Mario Kart 64", "price": "18,50", "currency": "EUR"},
            {"id": 103, "title": "Zelda", "price": 0},
            {"id": null, "title": "Broken", "price": "10"}
        ]}"#;

        let catalog: CatalogResponse = serde_json::from_str(body).unwrap();
        let candidates: Vec<ListingCandidate> = catalog
            .items
            .into_iter()
            .filter_map(|item| to_candidate(item, "www.vinted.fr"))
            .collect();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].external_id, "101");
        assert_eq!(candidates[0].price, 25.0);
        assert_eq!(candidates[0].origin, Origin::Domain("www.vinted.fr".into()));
        assert_eq!(candidates[0].condition_hint.as_deref(), Some("Très bon état"));
        assert_eq!(candidates[1].external_id, "102");
        assert_eq!(candidates[1].price, 18.5);
    }

    #[test]
    fn test_failed_outcome_carries_debug() {
        let outcome = PeerOutcome::failed(PeerStage::Decode, Some(200), "bad json", false);
        assert!(outcome.candidates.is_empty());
        let debug = outcome.debug.unwrap();
        assert_eq!(debug.stage, PeerStage::Decode);
        assert_eq!(debug.status, Some(200));
    }
}
