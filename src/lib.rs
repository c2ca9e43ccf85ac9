//! retrotrack - Retro game price tracker
//!
//! Consolidates region-specific catalog variants of retro games and hardware
//! into canonical entities, then keeps their market listings fresh with one
//! acquisition worker per region.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`normalize`] - Name normalization and slugs
//! - [`classify`] - Region, condition and junk heuristics
//! - [`resolve`] - Identity resolution into canonical entities
//! - [`sources`] - Auction, storefront and peer marketplace clients
//! - [`acquisition`] - Category strategies, filtering and persistence
//! - [`worker`] - Regional worker loops
//! - [`storage`] - Datastore (SQLite)
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use retrotrack::config::Config;
//! use retrotrack::resolve::IdentityResolver;
//! use retrotrack::storage::create_sqlite_repository;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let repo = create_sqlite_repository(&config.database.sqlite_path)?;
//!     let stats = IdentityResolver::new(repo).run()?;
//!     println!("{} entities created", stats.entities_created);
//!     Ok(())
//! }
//! ```

pub mod acquisition;
pub mod classify;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod resolve;
pub mod sources;
pub mod storage;
pub mod utils;
pub mod worker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::acquisition::{Acquirer, PassSummary, RegionScope, Strategy};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, RetrotrackErrorTrait};
    pub use crate::models::{
        CanonicalEntity, Condition, Listing, NewVariant, ProductCategory, Region, RegionTag,
        SourceKind, Variant,
    };
    pub use crate::resolve::IdentityResolver;
    pub use crate::sources::{ListingSource, SourceSet};
    pub use crate::storage::{Repository, SharedRepository};
    pub use crate::worker::{Coordinator, RegionalWorker};
}

// Direct re-exports for convenience
pub use models::{Condition, Region, RegionTag};
