//! Storage seam for the cache: three logical tables (players, stats,
//! matchups) with insert-or-replace semantics, range deletes by player
//! timestamp, and per-table counts.
//!
//! Concurrent writers race at single-row granularity; overlapping keys
//! resolve last-writer-wins, which callers must tolerate.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{MatchupRecord, PlayerRecord, StatRecord};

const PLAYERS_FILE: &str = "players.json";
const STATS_FILE: &str = "stats.json";
const MATCHUPS_FILE: &str = "matchups.json";

/// Row counts per table, used for weight-estimated cache sizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub players: usize,
    pub stats: usize,
    pub matchups: usize,
}

/// The single mutable shared resource of the core. Injected into the
/// cache manager and repository so tests can substitute `MemoryStore`.
pub trait LocalStore: Send + Sync {
    fn upsert_players(&self, players: &[PlayerRecord]) -> Result<()>;
    fn upsert_stats(&self, rows: &[StatRecord]) -> Result<()>;
    fn upsert_matchups(&self, rows: &[MatchupRecord]) -> Result<()>;

    fn player(&self, id: &str) -> Result<Option<PlayerRecord>>;
    fn players(&self) -> Result<Vec<PlayerRecord>>;
    fn stats_for(&self, player_id: &str, season: Option<u16>) -> Result<Vec<StatRecord>>;
    fn matchups_for(&self, player_id: &str, season: Option<u16>) -> Result<Vec<MatchupRecord>>;

    /// Delete every player whose `last_updated` is strictly older than the
    /// cutoff, cascading the player's stats and matchups. Returns the
    /// number of players removed.
    fn delete_players_older_than(&self, cutoff_ms: i64) -> Result<usize>;

    fn counts(&self) -> Result<StoreCounts>;
}

// ============================================================================
// Shared table logic
// ============================================================================

/// Row key for the stats table: player, season, week granularity.
fn stat_key(row: &StatRecord) -> String {
    match row.week {
        Some(week) => format!("{}:{}:{}", row.player_id, row.season, week),
        None => format!("{}:{}:season", row.player_id, row.season),
    }
}

/// Row key for the matchups table.
fn matchup_key(row: &MatchupRecord) -> String {
    format!(
        "{}:{}:{}:{}",
        row.player_id, row.opponent, row.season, row.week
    )
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    players: HashMap<String, PlayerRecord>,
    stats: HashMap<String, StatRecord>,
    matchups: HashMap<String, MatchupRecord>,
}

impl Tables {
    fn upsert_players(&mut self, players: &[PlayerRecord]) {
        for player in players {
            self.players.insert(player.id.clone(), player.clone());
        }
    }

    fn upsert_stats(&mut self, rows: &[StatRecord]) {
        for row in rows {
            self.stats.insert(stat_key(row), row.clone());
        }
    }

    fn upsert_matchups(&mut self, rows: &[MatchupRecord]) {
        for row in rows {
            self.matchups.insert(matchup_key(row), row.clone());
        }
    }

    fn delete_players_older_than(&mut self, cutoff_ms: i64) -> usize {
        let doomed: HashSet<String> = self
            .players
            .values()
            .filter(|p| p.last_updated < cutoff_ms)
            .map(|p| p.id.clone())
            .collect();

        if doomed.is_empty() {
            return 0;
        }

        self.players.retain(|id, _| !doomed.contains(id));
        // Cleanup-on-delete: the family goes with the player
        self.stats.retain(|_, r| !doomed.contains(&r.player_id));
        self.matchups.retain(|_, r| !doomed.contains(&r.player_id));
        doomed.len()
    }

    fn counts(&self) -> StoreCounts {
        StoreCounts {
            players: self.players.len(),
            stats: self.stats.len(),
            matchups: self.matchups.len(),
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Non-durable store backed by the same table logic as `JsonFileStore`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read_guard(lock: &RwLock<Tables>) -> Result<RwLockReadGuard<'_, Tables>> {
    lock.read().map_err(|_| anyhow::anyhow!("store lock poisoned"))
}

fn write_guard(lock: &RwLock<Tables>) -> Result<RwLockWriteGuard<'_, Tables>> {
    lock.write().map_err(|_| anyhow::anyhow!("store lock poisoned"))
}

impl LocalStore for MemoryStore {
    fn upsert_players(&self, players: &[PlayerRecord]) -> Result<()> {
        write_guard(&self.tables)?.upsert_players(players);
        Ok(())
    }

    fn upsert_stats(&self, rows: &[StatRecord]) -> Result<()> {
        write_guard(&self.tables)?.upsert_stats(rows);
        Ok(())
    }

    fn upsert_matchups(&self, rows: &[MatchupRecord]) -> Result<()> {
        write_guard(&self.tables)?.upsert_matchups(rows);
        Ok(())
    }

    fn player(&self, id: &str) -> Result<Option<PlayerRecord>> {
        Ok(read_guard(&self.tables)?.players.get(id).cloned())
    }

    fn players(&self) -> Result<Vec<PlayerRecord>> {
        Ok(read_guard(&self.tables)?.players.values().cloned().collect())
    }

    fn stats_for(&self, player_id: &str, season: Option<u16>) -> Result<Vec<StatRecord>> {
        Ok(read_guard(&self.tables)?
            .stats
            .values()
            .filter(|r| r.player_id == player_id && season.map_or(true, |s| r.season == s))
            .cloned()
            .collect())
    }

    fn matchups_for(&self, player_id: &str, season: Option<u16>) -> Result<Vec<MatchupRecord>> {
        Ok(read_guard(&self.tables)?
            .matchups
            .values()
            .filter(|r| r.player_id == player_id && season.map_or(true, |s| r.season == s))
            .cloned()
            .collect())
    }

    fn delete_players_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        Ok(write_guard(&self.tables)?.delete_players_older_than(cutoff_ms))
    }

    fn counts(&self) -> Result<StoreCounts> {
        Ok(read_guard(&self.tables)?.counts())
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Durable store: one JSON file per table in the cache directory,
/// loaded at open and written through on every mutation.
pub struct JsonFileStore {
    cache_dir: PathBuf,
    tables: RwLock<Tables>,
}

impl JsonFileStore {
    pub fn open(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache dir {}", cache_dir.display()))?;

        let tables = Tables {
            players: Self::load_table(&cache_dir, PLAYERS_FILE)?,
            stats: Self::load_table(&cache_dir, STATS_FILE)?,
            matchups: Self::load_table(&cache_dir, MATCHUPS_FILE)?,
        };

        debug!(
            players = tables.players.len(),
            stats = tables.stats.len(),
            matchups = tables.matchups.len(),
            "Opened cache store"
        );

        Ok(Self {
            cache_dir,
            tables: RwLock::new(tables),
        })
    }

    fn load_table<T: serde::de::DeserializeOwned + Default>(dir: &PathBuf, name: &str) -> Result<T> {
        let path = dir.join(name);
        if !path.exists() {
            return Ok(T::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        serde_json::from_str(&contents).with_context(|| format!("Failed to parse cache file: {}", name))
    }

    fn save_table<T: Serialize>(&self, name: &str, table: &T) -> Result<()> {
        let path = self.cache_dir.join(name);
        let contents = serde_json::to_string_pretty(table)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        Ok(())
    }
}

impl LocalStore for JsonFileStore {
    fn upsert_players(&self, players: &[PlayerRecord]) -> Result<()> {
        let mut tables = write_guard(&self.tables)?;
        tables.upsert_players(players);
        self.save_table(PLAYERS_FILE, &tables.players)
    }

    fn upsert_stats(&self, rows: &[StatRecord]) -> Result<()> {
        let mut tables = write_guard(&self.tables)?;
        tables.upsert_stats(rows);
        self.save_table(STATS_FILE, &tables.stats)
    }

    fn upsert_matchups(&self, rows: &[MatchupRecord]) -> Result<()> {
        let mut tables = write_guard(&self.tables)?;
        tables.upsert_matchups(rows);
        self.save_table(MATCHUPS_FILE, &tables.matchups)
    }

    fn player(&self, id: &str) -> Result<Option<PlayerRecord>> {
        Ok(read_guard(&self.tables)?.players.get(id).cloned())
    }

    fn players(&self) -> Result<Vec<PlayerRecord>> {
        Ok(read_guard(&self.tables)?.players.values().cloned().collect())
    }

    fn stats_for(&self, player_id: &str, season: Option<u16>) -> Result<Vec<StatRecord>> {
        Ok(read_guard(&self.tables)?
            .stats
            .values()
            .filter(|r| r.player_id == player_id && season.map_or(true, |s| r.season == s))
            .cloned()
            .collect())
    }

    fn matchups_for(&self, player_id: &str, season: Option<u16>) -> Result<Vec<MatchupRecord>> {
        Ok(read_guard(&self.tables)?
            .matchups
            .values()
            .filter(|r| r.player_id == player_id && season.map_or(true, |s| r.season == s))
            .cloned()
            .collect())
    }

    fn delete_players_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        let mut tables = write_guard(&self.tables)?;
        let removed = tables.delete_players_older_than(cutoff_ms);
        if removed > 0 {
            self.save_table(PLAYERS_FILE, &tables.players)?;
            self.save_table(STATS_FILE, &tables.stats)?;
            self.save_table(MATCHUPS_FILE, &tables.matchups)?;
        }
        Ok(removed)
    }

    fn counts(&self) -> Result<StoreCounts> {
        Ok(read_guard(&self.tables)?.counts())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InjuryStatus, Position};

    fn player(id: &str, last_updated: i64) -> PlayerRecord {
        PlayerRecord {
            id: id.to_string(),
            name: format!("Player {}", id),
            position: Position::WideReceiver,
            team: "MIN".to_string(),
            injury_status: InjuryStatus::Healthy,
            active: true,
            last_updated,
        }
    }

    fn stat(player_id: &str, season: u16, week: Option<u8>) -> StatRecord {
        StatRecord {
            player_id: player_id.to_string(),
            season,
            week,
            fantasy_points: 10.0,
            passing_yards: 0.0,
            rushing_yards: 0.0,
            receiving_yards: 100.0,
            touchdowns: 1,
            game_time: 1_726_000_000_000,
        }
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let p = player("1", 1000);
        store.upsert_players(std::slice::from_ref(&p)).unwrap();

        let loaded = store.player("1").unwrap().expect("player present");
        assert_eq!(loaded, p);
        assert_eq!(store.player("2").unwrap(), None);
    }

    #[test]
    fn test_upsert_replaces_by_composite_key() {
        let store = MemoryStore::new();
        store.upsert_stats(&[stat("1", 2025, Some(3))]).unwrap();

        let mut updated = stat("1", 2025, Some(3));
        updated.fantasy_points = 25.0;
        store.upsert_stats(&[updated]).unwrap();

        // Same key replaced in place, new week appended
        store.upsert_stats(&[stat("1", 2025, Some(4))]).unwrap();

        let rows = store.stats_for("1", Some(2025)).unwrap();
        assert_eq!(rows.len(), 2);
        let week3 = rows.iter().find(|r| r.week == Some(3)).unwrap();
        assert_eq!(week3.fantasy_points, 25.0);
    }

    #[test]
    fn test_delete_cascades_family() {
        let store = MemoryStore::new();
        store
            .upsert_players(&[player("old", 1000), player("new", 5000)])
            .unwrap();
        store
            .upsert_stats(&[stat("old", 2024, Some(1)), stat("new", 2025, Some(1))])
            .unwrap();
        store
            .upsert_matchups(&[MatchupRecord::placeholder("old", "GB", 2024)])
            .unwrap();

        let removed = store.delete_players_older_than(2000).unwrap();
        assert_eq!(removed, 1);

        assert!(store.player("old").unwrap().is_none());
        assert!(store.player("new").unwrap().is_some());
        assert!(store.stats_for("old", None).unwrap().is_empty());
        assert_eq!(store.stats_for("new", None).unwrap().len(), 1);
        assert!(store.matchups_for("old", None).unwrap().is_empty());

        let counts = store.counts().unwrap();
        assert_eq!(
            counts,
            StoreCounts {
                players: 1,
                stats: 1,
                matchups: 0
            }
        );
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().to_path_buf();

        {
            let store = JsonFileStore::open(path.clone()).unwrap();
            store.upsert_players(&[player("1", 42)]).unwrap();
            store.upsert_stats(&[stat("1", 2025, None)]).unwrap();
        }

        let reopened = JsonFileStore::open(path).unwrap();
        let loaded = reopened.player("1").unwrap().expect("player survived");
        assert_eq!(loaded.last_updated, 42);
        assert_eq!(reopened.stats_for("1", None).unwrap().len(), 1);
    }

    #[test]
    fn test_matchup_upsert_by_key() {
        let store = MemoryStore::new();
        let mut m = MatchupRecord::placeholder("1", "GB", 2024);
        m.week = 7;
        store.upsert_matchups(std::slice::from_ref(&m)).unwrap();

        m.fantasy_points = 19.0;
        store.upsert_matchups(std::slice::from_ref(&m)).unwrap();

        let rows = store.matchups_for("1", Some(2024)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fantasy_points, 19.0);
    }
}
