//! Configuration management for retrotrack
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Region;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Auction marketplace API
    pub auction: AuctionConfig,

    /// HTML storefronts
    pub storefront: StorefrontConfig,

    /// Peer-to-peer marketplace
    pub peer: PeerConfig,

    /// Regional workers
    pub worker: WorkerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/retrotrack.db"),
        }
    }
}

/// Auction marketplace API configuration (OAuth2 client credentials)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
    pub enabled: bool,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    /// Token endpoint
    pub auth_url: String,

    /// Browse API base URL
    pub api_base: String,

    pub scope: String,

    /// Maximum results per search
    pub result_limit: usize,

    pub timeout_secs: u64,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client_id: None,
            client_secret: None,
            auth_url: String::from("https://api.ebay.com/identity/v1/oauth2/token"),
            api_base: String::from("https://api.ebay.com/buy/browse/v1"),
            scope: String::from("https://api.ebay.com/oauth/api_scope"),
            result_limit: 20,
            timeout_secs: 15,
        }
    }
}

/// Region-locked storefront domain pools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainPools {
    pub pal: Vec<String>,
    pub ntsc: Vec<String>,
    pub jp: Vec<String>,
}

impl DomainPools {
    pub fn for_region(&self, region: Region) -> &[String] {
        match region {
            Region::Pal => &self.pal,
            Region::Ntsc => &self.ntsc,
            Region::Jp => &self.jp,
        }
    }
}

impl Default for DomainPools {
    fn default() -> Self {
        Self {
            pal: vec![
                "www.amazon.fr".to_string(),
                "www.amazon.de".to_string(),
                "www.amazon.it".to_string(),
                "www.amazon.es".to_string(),
                "www.amazon.co.uk".to_string(),
            ],
            ntsc: vec!["www.amazon.com".to_string(), "www.amazon.ca".to_string()],
            jp: vec!["www.amazon.co.jp".to_string()],
        }
    }
}

/// HTML storefront configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorefrontConfig {
    pub enabled: bool,
    pub pools: DomainPools,

    /// Result rows parsed per search page
    pub result_limit: usize,

    /// Rate limit (requests per second) across all storefront domains
    pub requests_per_second: u32,

    pub timeout_secs: u64,

    /// Concurrent scrapes in a parallel batch
    pub scrape_pool_size: usize,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pools: DomainPools::default(),
            result_limit: 5,
            requests_per_second: 1,
            timeout_secs: 10,
            scrape_pool_size: 4,
        }
    }
}

/// Peer marketplace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub enabled: bool,
    pub result_limit: usize,
    pub timeout_secs: u64,

    /// Session cookies older than this are re-bootstrapped
    pub session_ttl_secs: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            result_limit: 20,
            timeout_secs: 10,
            session_ttl_secs: 1800,
        }
    }
}

/// Inclusive pause bounds in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingBounds {
    pub min_ms: u64,
    pub max_ms: u64,
}

/// Regional worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Regions to run a worker for
    pub regions: Vec<Region>,

    /// Variants selected per batch
    pub batch_size: usize,

    /// Region that claims variants tagged `standard`
    pub fallback_region: Region,

    /// Pause between items when the domain pool rotates across several domains
    pub multi_domain_pacing: PacingBounds,

    /// Pause between items when the pool holds a single domain
    pub single_domain_pacing: PacingBounds,

    /// Sleep when a batch comes back empty
    pub idle_secs: u64,

    /// Pause after a loop-level fault
    pub backoff_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            regions: Region::all().to_vec(),
            batch_size: 10,
            fallback_region: Region::Ntsc,
            multi_domain_pacing: PacingBounds {
                min_ms: 3_000,
                max_ms: 8_000,
            },
            single_domain_pacing: PacingBounds {
                min_ms: 10_000,
                max_ms: 20_000,
            },
            idle_secs: 60,
            backoff_secs: 300,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables, starting from defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("RETROTRACK_SQLITE_PATH") {
            config.database.sqlite_path = path.into();
        }

        if let Some(enabled) = env_parse("RETROTRACK_AUCTION_ENABLED") {
            config.auction.enabled = enabled;
        }
        config.auction.client_id = std::env::var("RETROTRACK_AUCTION_CLIENT_ID").ok();
        config.auction.client_secret = std::env::var("RETROTRACK_AUCTION_CLIENT_SECRET").ok();
        if let Ok(url) = std::env::var("RETROTRACK_AUCTION_AUTH_URL") {
            config.auction.auth_url = url;
        }
        if let Ok(url) = std::env::var("RETROTRACK_AUCTION_API_BASE") {
            config.auction.api_base = url;
        }

        if let Some(pool) = env_list("RETROTRACK_STOREFRONT_PAL") {
            config.storefront.pools.pal = pool;
        }
        if let Some(pool) = env_list("RETROTRACK_STOREFRONT_NTSC") {
            config.storefront.pools.ntsc = pool;
        }
        if let Some(pool) = env_list("RETROTRACK_STOREFRONT_JP") {
            config.storefront.pools.jp = pool;
        }
        if let Some(rps) = env_parse("RETROTRACK_STOREFRONT_RPS") {
            config.storefront.requests_per_second = rps;
        }

        if let Some(enabled) = env_parse("RETROTRACK_PEER_ENABLED") {
            config.peer.enabled = enabled;
        }

        if let Some(regions) = env_list("RETROTRACK_WORKER_REGIONS") {
            config.worker.regions = regions
                .iter()
                .map(|r| r.parse::<Region>().map_err(anyhow::Error::msg))
                .collect::<Result<_>>()
                .context("Invalid RETROTRACK_WORKER_REGIONS")?;
        }
        if let Some(size) = env_parse("RETROTRACK_WORKER_BATCH_SIZE") {
            config.worker.batch_size = size;
        }
        if let Ok(region) = std::env::var("RETROTRACK_FALLBACK_REGION") {
            config.worker.fallback_region = region
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid RETROTRACK_FALLBACK_REGION")?;
        }

        if let Ok(level) = std::env::var("RETROTRACK_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("RETROTRACK_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.worker.regions.is_empty() {
            bail!("worker.regions must not be empty");
        }

        if self.worker.batch_size == 0 {
            bail!("worker.batch_size must be greater than 0");
        }

        for (name, bounds) in [
            ("multi_domain_pacing", self.worker.multi_domain_pacing),
            ("single_domain_pacing", self.worker.single_domain_pacing),
        ] {
            if bounds.min_ms > bounds.max_ms {
                bail!("worker.{name}: min_ms must not exceed max_ms");
            }
        }

        if self.storefront.requests_per_second == 0 {
            bail!("storefront.requests_per_second must be greater than 0");
        }

        if self.storefront.scrape_pool_size == 0 {
            bail!("storefront.scrape_pool_size must be greater than 0");
        }

        if self.storefront.enabled {
            for region in &self.worker.regions {
                if self.storefront.pools.for_region(*region).is_empty() {
                    bail!("storefront.pools.{region} must list at least one domain");
                }
            }
        }

        Ok(())
    }

    /// Fail when the auction source is enabled without credentials
    pub fn require_auction_credentials(&self) -> Result<()> {
        if !self.auction.enabled {
            return Ok(());
        }
        let missing = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        if missing(&self.auction.client_id) {
            bail!("auction.client_id is required when the auction source is enabled");
        }
        if missing(&self.auction.client_secret) {
            bail!("auction.client_secret is required when the auction source is enabled");
        }
        Ok(())
    }

    #[must_use]
    pub fn auction_timeout(&self) -> Duration {
        Duration::from_secs(self.auction.timeout_secs)
    }

    #[must_use]
    pub fn storefront_timeout(&self) -> Duration {
        Duration::from_secs(self.storefront.timeout_secs)
    }

    #[must_use]
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer.timeout_secs)
    }

    #[must_use]
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.worker.idle_secs)
    }

    #[must_use]
    pub fn backoff_interval(&self) -> Duration {
        Duration::from_secs(self.worker.backoff_secs)
    }
}
