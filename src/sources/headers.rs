//! Browser-like request headers for the scraped sources

use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, REFERER,
    USER_AGENT,
};

/// Desktop browser User-Agents rotated per request
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Kind of request a browser would be making
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Profile {
    /// Top-level navigation to an HTML page
    Navigate,
    /// Same-origin fetch of a JSON endpoint
    Xhr,
}

impl Profile {
    fn accept(self) -> &'static str {
        match self {
            Self::Navigate => {
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
            }
            Self::Xhr => "application/json, text/plain, */*",
        }
    }

    fn fixed(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Navigate => &[
                ("sec-fetch-dest", "document"),
                ("sec-fetch-mode", "navigate"),
                ("sec-fetch-site", "same-origin"),
                ("sec-fetch-user", "?1"),
                ("upgrade-insecure-requests", "1"),
            ],
            Self::Xhr => &[
                ("sec-fetch-dest", "empty"),
                ("sec-fetch-mode", "cors"),
                ("sec-fetch-site", "same-origin"),
                ("x-requested-with", "XMLHttpRequest"),
            ],
        }
    }

    fn headers(self, user_agent: &str, referer: &str, accept_language: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();

        // Caller-supplied values that fail header validation are dropped
        for (name, value) in [
            (USER_AGENT, user_agent),
            (REFERER, referer),
            (ACCEPT_LANGUAGE, accept_language),
        ] {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(name, value);
            }
        }

        headers.insert(ACCEPT, HeaderValue::from_static(self.accept()));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        for &(name, value) in self.fixed() {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        headers
    }
}

/// Headers for loading a storefront search page (or the peer home page)
///
/// # Examples
///
/// ```
/// use retrotrack::sources::headers::build_storefront_headers;
///
/// let headers = build_storefront_headers(
///     "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
///     "https://www.amazon.fr/",
///     "fr-FR,fr;q=0.9",
/// );
/// assert!(headers.contains_key("accept-language"));
/// ```
pub fn build_storefront_headers(user_agent: &str, referer: &str, accept_language: &str) -> HeaderMap {
    Profile::Navigate.headers(user_agent, referer, accept_language)
}

/// Headers for the peer marketplace's JSON catalog endpoint
pub fn build_json_headers(user_agent: &str, referer: &str, accept_language: &str) -> HeaderMap {
    Profile::Xhr.headers(user_agent, referer, accept_language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storefront_headers() {
        let headers = build_storefront_headers(
            "Mozilla/5.0 Test",
            "https://www.amazon.co.jp/",
            "ja-JP,ja;q=0.9",
        );

        assert_eq!(headers.get(USER_AGENT).unwrap(), "Mozilla/5.0 Test");
        assert_eq!(headers.get(REFERER).unwrap(), "https://www.amazon.co.jp/");
        assert_eq!(headers.get(ACCEPT_LANGUAGE).unwrap(), "ja-JP,ja;q=0.9");
        assert_eq!(headers.get("sec-fetch-mode").unwrap(), "navigate");
        assert!(headers.get("x-requested-with").is_none());
    }

    #[test]
    fn test_json_headers() {
        let headers = build_json_headers("UA", "https://www.vinted.fr/", "fr-FR");
        assert_eq!(headers.get("x-requested-with").unwrap(), "XMLHttpRequest");
        assert_eq!(headers.get("sec-fetch-mode").unwrap(), "cors");
        assert!(headers
            .get(ACCEPT)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("application/json"));
    }

    #[test]
    fn test_invalid_header_value_is_skipped() {
        let headers = build_storefront_headers("bad\nagent", "https://www.amazon.de/", "de-DE");
        assert!(headers.get(USER_AGENT).is_none());
        assert!(headers.get(ACCEPT).is_some());
    }

    #[test]
    fn test_random_user_agent_from_pool() {
        for _ in 0..10 {
            assert!(USER_AGENTS.contains(&random_user_agent()));
        }
    }
}
