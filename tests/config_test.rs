//! Tests for config loading

use std::io::Write;
use std::path::Path;

use retrotrack::config::Config;
use retrotrack::models::Region;

#[test]
fn test_config_file_exists() {
    let config_path = Path::new("config.toml");
    assert!(
        config_path.exists(),
        "config.toml should exist in project root"
    );
}

#[test]
fn test_shipped_config_is_valid() {
    let config = Config::from_file(Path::new("config.toml")).expect("config.toml should parse");
    config.validate().expect("config.toml should validate");

    assert_eq!(config.worker.fallback_region, Region::Ntsc);
    assert_eq!(config.worker.regions, vec![Region::Pal, Region::Ntsc, Region::Jp]);
    assert_eq!(config.storefront.pools.for_region(Region::Jp), ["www.amazon.co.jp"]);
    assert!(config.worker.multi_domain_pacing.max_ms < config.worker.single_domain_pacing.min_ms);
}

#[test]
fn test_from_file_reports_bad_toml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[worker\nbatch_size = ").unwrap();

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse TOML"));
}

#[test]
fn test_from_file_missing_path() {
    let err = Config::from_file(Path::new("does/not/exist.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_enabled_auction_requires_credentials() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[auction]\nenabled = true\nclient_id = \"id\"").unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert!(config.require_auction_credentials().is_err());

    let mut disabled = config.clone();
    disabled.auction.enabled = false;
    assert!(disabled.require_auction_credentials().is_ok());
}

#[test]
fn test_from_env_overrides_defaults() {
    std::env::set_var("RETROTRACK_WORKER_REGIONS", "pal, jp");
    std::env::set_var("RETROTRACK_FALLBACK_REGION", "pal");
    std::env::set_var("RETROTRACK_STOREFRONT_PAL", "www.amazon.fr,www.amazon.de");

    let config = Config::from_env().unwrap();

    std::env::remove_var("RETROTRACK_WORKER_REGIONS");
    std::env::remove_var("RETROTRACK_FALLBACK_REGION");
    std::env::remove_var("RETROTRACK_STOREFRONT_PAL");

    assert_eq!(config.worker.regions, vec![Region::Pal, Region::Jp]);
    assert_eq!(config.worker.fallback_region, Region::Pal);
    assert_eq!(config.storefront.pools.pal.len(), 2);
}
