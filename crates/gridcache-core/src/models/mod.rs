//! Data models for NFL player entities.
//!
//! This module contains all the data structures used to represent
//! cached player data including:
//!
//! - `PlayerRecord`: Player identity, team, and availability status
//! - `StatRecord`: Per-season/per-week statistical lines
//! - `MatchupRecord`, `MatchupReport`: Historical games against an opponent
//! - Wire wrappers (`ApiPlayer`, `ApiStatLine`, `ApiGameLog`) for the
//!   upstream's camelCase payloads

pub mod matchup;
pub mod player;
pub mod stats;

pub use matchup::{performance_rating, ApiGameLog, MatchupRecord, MatchupReport, NEUTRAL_RATING};
pub use player::{ApiPlayer, InjuryStatus, PlayerListResponse, PlayerRecord, Position};
pub use stats::{ApiStatLine, StatRecord};
