//! REST API client module for the upstream sports data service.
//!
//! This module provides the `SportsApiClient` for fetching player,
//! stat, and game log data, and the `RemoteSource` trait that the
//! repository consumes so tests can substitute a mock remote.
//!
//! Every call here is a single network attempt - retry and rate
//! limiting live entirely in the `limiter` module.

pub mod client;

pub use client::{RemoteSource, SportsApiClient};
