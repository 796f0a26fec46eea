//! Core library for gridcache - the offline-first data access layer of
//! an NFL player statistics and matchup companion.
//!
//! The UI layer talks to one type, [`Repository`], which composes:
//!
//! - a [`RateLimiter`] that admits at most N requests per rolling minute
//!   with a concurrency cap and retries failures with exponential backoff
//! - a [`SportsApiClient`] performing single network attempts against the
//!   upstream, classifying failures into [`DataError`]
//! - a [`CacheManager`] enforcing a 100 MiB bound and 24-hour freshness
//!   over a [`LocalStore`]
//!
//! Reads are offline-first: fresh or offline cache hits never touch the
//! network, stale hits are served immediately while a background refresh
//! runs, and any failure with a cached fallback degrades to the cached
//! value. All failures cross the boundary as [`DataError`] values.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod models;
pub mod repository;
pub mod utils;

pub use api::{RemoteSource, SportsApiClient};
pub use cache::{CacheManager, EvictionOutcome, JsonFileStore, LocalStore, MemoryStore};
pub use config::CoreConfig;
pub use error::DataError;
pub use limiter::{Priority, RateLimiter, RateLimiterConfig};
pub use models::{
    InjuryStatus, MatchupRecord, MatchupReport, PlayerRecord, Position, StatRecord,
};
pub use repository::{RepoEvent, Repository, Resource};
