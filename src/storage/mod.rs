//! Datastore access
//!
//! SQLite holds variants, canonical entities and listings. Callers go through
//! the [`Repository`] trait so the resolver and workers can run against the
//! in-memory mock in tests.

pub mod repository;

pub use repository::{
    create_mock_repository, create_sqlite_repository, MockRepository, ReplaceStats, Repository,
    SharedRepository, SqliteRepository,
};
