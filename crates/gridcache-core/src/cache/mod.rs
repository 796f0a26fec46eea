//! Local caching module for offline data access.
//!
//! This module provides persistent storage for player data and the
//! `CacheManager` that enforces the storage bound and freshness
//! semantics over it:
//!
//! - `LocalStore`: the storage seam (upsert, range delete, counts)
//! - `JsonFileStore`: durable JSON tables in the cache directory
//! - `MemoryStore`: in-memory fake for tests and previews
//! - `CacheManager`: 24-hour freshness, 100 MiB ceiling, oldest-first
//!   eviction

pub mod manager;
pub mod store;

pub use manager::{CacheManager, EvictionOutcome};
pub use store::{JsonFileStore, LocalStore, MemoryStore, StoreCounts};
