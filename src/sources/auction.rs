//! Auction marketplace API client
//!
//! OAuth2 client-credentials flow with a cached bearer token. The token is
//! refreshed behind a `tokio::sync::Mutex`, so concurrent workers that see an
//! expired token trigger a single exchange. A 401 on search invalidates the
//! token and retries once.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{ListingSource, SearchRequest};
use crate::classify::auction_site_for_host;
use crate::config::AuctionConfig;
use crate::models::{ListingCandidate, Origin, SourceKind};
use crate::utils::error::{FetchError, ParseError};
use crate::utils::extract_domain;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Tokens are refreshed this long before they actually expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Header selecting the marketplace a search runs against
const MARKETPLACE_HEADER: &str = "X-EBAY-C-MARKETPLACE-ID";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now() + TOKEN_EXPIRY_MARGIN
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    item_summaries: Vec<ItemSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemSummary {
    item_id: String,
    title: String,
    price: Option<ItemPrice>,
    item_web_url: Option<String>,
    image: Option<ItemImage>,
    condition: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemPrice {
    value: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemImage {
    image_url: String,
}

/// Auction marketplace source
pub struct AuctionSource {
    client: Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_url: String,
    api_base: String,
    scope: String,
    result_limit: usize,
    token: Mutex<Option<CachedToken>>,
    retry: RetryConfig,
}

impl AuctionSource {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &AuctionConfig, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).gzip(true).build()?;

        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_url: config.auth_url.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            scope: config.scope.clone(),
            result_limit: config.result_limit.max(1),
            token: Mutex::new(None),
            retry: RetryConfig::default(),
        })
    }

    /// Override the token exchange retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Return a valid bearer token, exchanging credentials when the cached
    /// one is missing, near expiry or `force_refresh` is set
    async fn access_token(&self, force_refresh: bool) -> Result<String, FetchError> {
        let mut cached = self.token.lock().await;

        if !force_refresh {
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = with_retry_if(
            &self.retry,
            || self.exchange_token(),
            |e: &FetchError| {
                matches!(
                    e,
                    FetchError::Timeout | FetchError::Http(_) | FetchError::ServerError(_)
                )
            },
        )
        .await?;

        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        debug!("Auction token refreshed");
        Ok(access_token)
    }

    async fn exchange_token(&self) -> Result<CachedToken, FetchError> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or(FetchError::MissingCredentials("auction.client_id"))?;
        let client_secret = self
            .client_secret
            .as_deref()
            .ok_or(FetchError::MissingCredentials("auction.client_secret"))?;

        let response = self
            .client
            .post(&self.auth_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await
            .map_err(FetchError::from_request)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(FetchError::ServerError(status.as_u16()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::Auth(format!(
                "token exchange failed (status={status}): {text}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ParseError::UnexpectedPayload(format!("token response: {e}")))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    async fn send_search(
        &self,
        request: &SearchRequest<'_>,
        marketplace_id: &str,
        token: &str,
    ) -> Result<reqwest::Response, FetchError> {
        let mut query: Vec<(&str, String)> = vec![
            ("q", request.query.to_string()),
            ("limit", request.limit.min(self.result_limit).to_string()),
        ];
        if let Some(category) = request.category_id {
            query.push(("category_ids", category.to_string()));
        }

        self.client
            .get(format!("{}/item_summary/search", self.api_base))
            .bearer_auth(token)
            .header(MARKETPLACE_HEADER, marketplace_id)
            .query(&query)
            .send()
            .await
            .map_err(FetchError::from_request)
    }
}

/// Marketplace a result is listed on, read from its own URL.
///
/// Searches can surface items from other national sites, so the requested
/// marketplace is only assumed when the result carries no usable URL. A host
/// that is not a known auction site is kept as a domain origin.
fn listing_origin(url: Option<&str>, requested: &str) -> Origin {
    match url.and_then(extract_domain) {
        Some(host) => match auction_site_for_host(&host) {
            Some(site) => Origin::Marketplace(site.marketplace_id.to_string()),
            None => Origin::Domain(host),
        },
        None => Origin::Marketplace(requested.to_string()),
    }
}

fn to_candidate(item: ItemSummary, marketplace_id: &str) -> Option<ListingCandidate> {
    let price = item.price?;
    let value: f64 = match price.value.trim().parse() {
        Ok(v) if v > 0.0 => v,
        _ => {
            debug!(item_id = %item.item_id, value = %price.value, "Skipping unparseable price");
            return None;
        }
    };

    let origin = listing_origin(item.item_web_url.as_deref(), marketplace_id);
    Some(ListingCandidate {
        source: SourceKind::Auction,
        external_id: item.item_id,
        title: item.title,
        price: value,
        currency: price.currency,
        url: item.item_web_url,
        image_url: item.image.map(|i| i.image_url),
        origin,
        condition_hint: item.condition,
    })
}

#[async_trait::async_trait]
impl ListingSource for AuctionSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Auction
    }

    async fn search(
        &self,
        request: &SearchRequest<'_>,
    ) -> Result<Vec<ListingCandidate>, FetchError> {
        let Some(marketplace_id) = request.marketplace.marketplace_id else {
            debug!(region = %request.region, "No auction marketplace for region");
            return Ok(Vec::new());
        };

        let token = self.access_token(false).await?;
        let mut response = self.send_search(request, marketplace_id, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(
                marketplace = marketplace_id,
                "Auction token rejected, refreshing once"
            );
            let token = self.access_token(true).await?;
            response = self.send_search(request, marketplace_id, &token).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(FetchError::Auth(
                    "search rejected after token refresh".to_string(),
                ));
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::ServerError(status.as_u16()));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ParseError::UnexpectedPayload(format!("search response: {e}")))?;

        let candidates: Vec<ListingCandidate> = body
            .item_summaries
            .into_iter()
            .filter_map(|item| to_candidate(item, marketplace_id))
            .take(request.limit.min(self.result_limit))
            .collect();

        debug!(
            marketplace = marketplace_id,
            query = request.query,
            results = candidates.len(),
            "Auction search complete"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, value: &str) -> ItemSummary {
        ItemSummary {
            item_id: id.to_string(),
            title: "Super Mario 64 PAL".to_string(),
            price: Some(ItemPrice {
                value: value.to_string(),
                currency: "EUR".to_string(),
            }),
            item_web_url: Some(format!("https://www.ebay.fr/itm/{id}")),
            image: None,
            condition: Some("Used".to_string()),
        }
    }

    #[test]
    fn test_to_candidate() {
        let candidate = to_candidate(summary("v1|1|0", "24.90"), "EBAY_FR").unwrap();
        assert_eq!(candidate.price, 24.90);
        assert_eq!(candidate.origin, Origin::Marketplace("EBAY_FR".into()));
        assert_eq!(candidate.condition_hint.as_deref(), Some("Used"));
    }

    #[test]
    fn test_origin_follows_item_url() {
        let mut item = summary("v1|2|0", "19.00");
        item.item_web_url = Some("https://www.ebay.com/itm/2".into());
        let candidate = to_candidate(item, "EBAY_FR").unwrap();
        assert_eq!(candidate.origin, Origin::Marketplace("EBAY_US".into()));

        let mut unlisted = summary("v1|3|0", "19.00");
        unlisted.item_web_url = None;
        let candidate = to_candidate(unlisted, "EBAY_FR").unwrap();
        assert_eq!(candidate.origin, Origin::Marketplace("EBAY_FR".into()));

        assert_eq!(
            listing_origin(Some("https://shop.example.com/p/1"), "EBAY_FR"),
            Origin::Domain("shop.example.com".into())
        );
    }

    #[test]
    fn test_to_candidate_rejects_bad_prices() {
        assert!(to_candidate(summary("a", "n/a"), "EBAY_FR").is_none());
        assert!(to_candidate(summary("b", "0"), "EBAY_FR").is_none());

        let mut no_price = summary("c", "1");
        no_price.price = None;
        assert!(to_candidate(no_price, "EBAY_FR").is_none());
    }

    #[test]
    fn test_search_response_tolerates_missing_items() {
        let body: SearchResponse = serde_json::from_str(r#"{"total": 0}"#).unwrap();
        assert!(body.item_summaries.is_empty());
    }

    #[test]
    fn test_cached_token_freshness() {
        let stale = CachedToken {
            access_token: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!stale.is_fresh());

        let fresh = CachedToken {
            access_token: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        };
        assert!(fresh.is_fresh());
    }
}
