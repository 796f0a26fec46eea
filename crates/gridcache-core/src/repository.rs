//! The single source of truth exposed to the UI layer.
//!
//! Owns the offline-first decision policy: cached data is served
//! whenever it is fresh or the device is offline, the network is only
//! consulted for misses and staleness, and every failure with a cached
//! fallback degrades to the cached value instead of an error. Concurrent
//! requests for the same logical key share one in-flight network call.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, info, warn};

use crate::api::RemoteSource;
use crate::cache::CacheManager;
use crate::error::DataError;
use crate::limiter::{Priority, RateLimiter, RateLimiterConfig};
use crate::models::{MatchupRecord, MatchupReport, PlayerRecord, StatRecord};
use crate::utils::{cmp_ignore_case, contains_ignore_case};

// ============================================================================
// Constants
// ============================================================================

/// Minimum spacing between successive outbound calls.
/// A client-side courtesy, layered in front of the hard rate limiter.
const MIN_REQUEST_SPACING: Duration = Duration::from_millis(250);

/// How long a caller will wait on a shared in-flight request before
/// clearing the dedup entry. Covers one full request timeout plus the
/// early retries so a stuck call cannot permanently block its key.
const INFLIGHT_JOIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Settle time after connectivity returns before the sync pass runs.
/// Absorbs the flapping that radios produce when coverage is marginal.
const CONNECTIVITY_DEBOUNCE: Duration = Duration::from_secs(2);

/// Buffer size for the update event channel.
/// 64 covers a burst refresh of every subscribed screen with headroom.
const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Result and event types
// ============================================================================

/// Non-blocking view of a record: in flight, available, or failed.
#[derive(Debug, Clone)]
pub enum Resource<T> {
    Loading,
    Ready(T),
    Failed(DataError),
}

impl<T> Resource<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Resource::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Update stream events for observe-style consumers.
#[derive(Debug, Clone)]
pub enum RepoEvent {
    PlayerUpdated(String),
    PlayersRefreshed(usize),
    StatsUpdated(String),
    MatchupsUpdated(String),
    SyncCompleted { expired: usize },
}

// ============================================================================
// In-flight request deduplication
// ============================================================================

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, DataError>>>;

/// Collapses concurrent identical requests onto one underlying network
/// call. Each entry removes itself from the map on completion and is
/// time-boxed so a stuck call cannot hold its key forever; once the
/// last joiner gives up, the underlying future is dropped and the
/// stuck call is cancelled.
struct InFlight<T> {
    map: Arc<Mutex<HashMap<String, SharedFetch<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> InFlight<T> {
    fn new() -> Self {
        Self {
            map: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn contains(&self, key: &str) -> bool {
        self.map.lock().await.contains_key(key)
    }

    async fn join_or_start<F>(&self, key: &str, start: F) -> Result<T, DataError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T, DataError>>,
    {
        let shared = {
            let mut map = self.map.lock().await;
            match map.get(key) {
                Some(existing) => {
                    debug!(key, "Joining in-flight request");
                    existing.clone()
                }
                None => {
                    let fetch = start();
                    let cleanup_map = self.map.clone();
                    let cleanup_key = key.to_string();
                    let shared = async move {
                        let result = fetch.await;
                        cleanup_map.lock().await.remove(&cleanup_key);
                        result
                    }
                    .boxed()
                    .shared();
                    map.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        match timeout(INFLIGHT_JOIN_TIMEOUT, shared).await {
            Ok(result) => result,
            Err(_) => {
                warn!(key, "In-flight request timed out, clearing entry");
                self.map.lock().await.remove(key);
                Err(DataError::Timeout)
            }
        }
    }
}

// ============================================================================
// Repository
// ============================================================================

/// Offline-first facade over the remote source, cache and rate limiter.
/// Cheap to clone; all state is shared behind one inner Arc.
pub struct Repository<R: RemoteSource> {
    inner: Arc<RepoInner<R>>,
}

impl<R: RemoteSource> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct RepoInner<R: RemoteSource> {
    remote: Arc<R>,
    cache: CacheManager,
    limiter: RateLimiter,
    /// Timestamp of the last outbound call; the courtesy throttle
    /// serializes all outbound traffic through this one lock.
    throttle: Mutex<Option<Instant>>,
    inflight_player: InFlight<PlayerRecord>,
    inflight_roster: InFlight<Vec<PlayerRecord>>,
    inflight_stats: InFlight<Vec<StatRecord>>,
    inflight_matchups: InFlight<Vec<MatchupRecord>>,
    connectivity: watch::Receiver<bool>,
    events: broadcast::Sender<RepoEvent>,
}

impl<R: RemoteSource> Repository<R> {
    pub fn new(remote: R, cache: CacheManager, connectivity: watch::Receiver<bool>) -> Self {
        Self::with_limiter(remote, cache, connectivity, RateLimiterConfig::default())
    }

    pub fn with_limiter(
        remote: R,
        cache: CacheManager,
        connectivity: watch::Receiver<bool>,
        limiter_config: RateLimiterConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RepoInner {
                remote: Arc::new(remote),
                cache,
                limiter: RateLimiter::new(limiter_config),
                throttle: Mutex::new(None),
                inflight_player: InFlight::new(),
                inflight_roster: InFlight::new(),
                inflight_stats: InFlight::new(),
                inflight_matchups: InFlight::new(),
                connectivity,
                events,
            }),
        }
    }

    /// Subscribe to record update and sync events.
    pub fn subscribe(&self) -> broadcast::Receiver<RepoEvent> {
        self.inner.events.subscribe()
    }

    pub fn online(&self) -> bool {
        self.inner.online()
    }

    pub fn cache(&self) -> &CacheManager {
        &self.inner.cache
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Offline-first player read.
    ///
    /// Fresh or offline cache hits return immediately with no network
    /// call. A stale hit while online returns the cached record and
    /// kicks off an unawaited background refresh. Misses (and
    /// `force_refresh`) go to the network; a failed fetch falls back to
    /// whatever cache exists before surfacing an error.
    pub async fn get_player(
        &self,
        player_id: &str,
        force_refresh: bool,
    ) -> Result<PlayerRecord, DataError> {
        let cached = self.inner.read_cached_player(player_id);

        if !force_refresh {
            if let Some(player) = cached.clone() {
                let fresh = self.inner.cache.is_fresh(player_id).unwrap_or(false);
                if fresh || !self.inner.online() {
                    debug!(player_id, fresh, "Serving cached player");
                    return Ok(player);
                }

                // Stale but online: serve the cached record now and
                // refresh behind the caller's back
                let repo = self.clone();
                let id = player_id.to_string();
                tokio::spawn(async move {
                    if let Err(err) = repo.refresh_player_shared(&id, Priority::Low).await {
                        debug!(player_id = %id, error = %err, "Background refresh failed");
                    }
                });
                return Ok(player);
            }
        }

        match self.refresh_player_shared(player_id, Priority::High).await {
            Ok(player) => Ok(player),
            Err(err) => {
                if let Some(player) = cached {
                    debug!(player_id, error = %err, "Fetch failed, serving cached fallback");
                    Ok(player)
                } else if !self.inner.online() {
                    Err(DataError::Connectivity)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Force a network refresh of one player.
    pub async fn refresh_player(&self, player_id: &str) -> Result<PlayerRecord, DataError> {
        self.get_player(player_id, true).await
    }

    /// Non-blocking three-way view of a player for UI polls.
    pub async fn peek_player(&self, player_id: &str) -> Resource<PlayerRecord> {
        let key = format!("player:{}", player_id);
        if self.inner.inflight_player.contains(&key).await {
            return Resource::Loading;
        }
        match self.inner.read_cached_player(player_id) {
            Some(player) => Resource::Ready(player),
            None if !self.inner.online() => Resource::Failed(DataError::Connectivity),
            None => Resource::Failed(DataError::EmptyResponse),
        }
    }

    /// Offline-first stat lines for one player and season.
    ///
    /// When the upstream has no stat detail at all, a zero-valued
    /// season-aggregate placeholder is cached and returned instead of
    /// an error.
    pub async fn player_stats(
        &self,
        player_id: &str,
        season: u16,
    ) -> Result<Vec<StatRecord>, DataError> {
        let cached = self
            .inner
            .cache
            .store()
            .stats_for(player_id, Some(season))
            .unwrap_or_else(|err| {
                warn!(player_id, error = %err, "Stat cache read failed, treating as miss");
                Vec::new()
            });

        if !cached.is_empty() {
            let fresh = self.inner.cache.is_fresh(player_id).unwrap_or(false);
            if fresh || !self.inner.online() {
                return Ok(cached);
            }
            // Stale but online: serve cached now, refresh in the background
            let repo = self.clone();
            let id = player_id.to_string();
            tokio::spawn(async move {
                if let Err(err) = repo.refresh_stats_shared(&id, season, Priority::Low).await {
                    debug!(player_id = %id, season, error = %err, "Background stat refresh failed");
                }
            });
            return Ok(cached);
        }

        if !self.inner.online() {
            return Err(DataError::Connectivity);
        }

        match self.refresh_stats_shared(player_id, season, Priority::High).await {
            Ok(rows) => Ok(rows),
            Err(DataError::EmptyResponse) | Err(DataError::Client(_)) => {
                // Upstream carries no stat detail for this player;
                // synthesize a clearly-flagged placeholder
                info!(player_id, season, "No stat detail upstream, caching placeholder");
                let row = StatRecord::placeholder(player_id, season);
                if let Err(err) = self.inner.cache.put_stats(std::slice::from_ref(&row)) {
                    warn!(player_id, error = %err, "Failed to cache placeholder stats");
                }
                let _ = self
                    .inner
                    .events
                    .send(RepoEvent::StatsUpdated(player_id.to_string()));
                Ok(vec![row])
            }
            Err(err) => Err(err),
        }
    }

    /// Offline-first game log for one player and season. An upstream
    /// without game logs yields an empty list, not an error.
    pub async fn player_matchups(
        &self,
        player_id: &str,
        season: u16,
    ) -> Result<Vec<MatchupRecord>, DataError> {
        let cached = self
            .inner
            .cache
            .store()
            .matchups_for(player_id, Some(season))
            .unwrap_or_else(|err| {
                warn!(player_id, error = %err, "Matchup cache read failed, treating as miss");
                Vec::new()
            });

        if !cached.is_empty() {
            let fresh = self.inner.cache.is_fresh(player_id).unwrap_or(false);
            if fresh || !self.inner.online() {
                return Ok(cached);
            }
        }

        if !self.inner.online() {
            // Offline with no history: nothing to aggregate, but the
            // caller can still render a neutral report
            return Ok(cached);
        }

        match self
            .refresh_matchups_shared(player_id, season, Priority::Normal)
            .await
        {
            Ok(rows) => Ok(rows),
            Err(DataError::EmptyResponse) | Err(DataError::Client(_)) => Ok(cached),
            Err(err) if !cached.is_empty() => {
                debug!(player_id, error = %err, "Matchup fetch failed, serving cached history");
                Ok(cached)
            }
            Err(err) => Err(err),
        }
    }

    /// Aggregated matchup history against one opponent.
    ///
    /// Always best-effort: with no history at all a neutral placeholder
    /// is cached and the report carries `insufficient_sample` rather
    /// than failing.
    pub async fn matchup_report(
        &self,
        player_id: &str,
        opponent: &str,
        season: u16,
    ) -> Result<MatchupReport, DataError> {
        let games = self.player_matchups(player_id, season).await?;
        let mut against: Vec<MatchupRecord> = games
            .into_iter()
            .filter(|g| g.opponent.eq_ignore_ascii_case(opponent))
            .collect();

        if against.is_empty() {
            let placeholder = MatchupRecord::placeholder(player_id, opponent, season);
            if let Err(err) = self
                .inner
                .cache
                .put_matchups(std::slice::from_ref(&placeholder))
            {
                warn!(player_id, error = %err, "Failed to cache placeholder matchup");
            }
            let _ = self
                .inner
                .events
                .send(RepoEvent::MatchupsUpdated(player_id.to_string()));
            against.push(placeholder);
        }

        against.sort_by(|a, b| (a.season, a.week).cmp(&(b.season, b.week)));
        Ok(MatchupReport::from_games(player_id, opponent, against))
    }

    /// Player search. The upstream has no search endpoint, so this is a
    /// client-side filter over the bulk roster; on any network failure
    /// it falls back to filtering cached players.
    pub async fn search_players(&self, query: &str) -> Result<Vec<PlayerRecord>, DataError> {
        if self.inner.online() {
            match self.refresh_roster_shared(Priority::Normal).await {
                Ok(roster) => return Ok(Self::filter_players(roster, query)),
                Err(err) => {
                    debug!(query, error = %err, "Roster fetch failed, searching cache");
                    let cached = self.inner.read_cached_players();
                    if cached.is_empty() {
                        return Err(err);
                    }
                    return Ok(Self::filter_players(cached, query));
                }
            }
        }

        let cached = self.inner.read_cached_players();
        if cached.is_empty() {
            return Err(DataError::Connectivity);
        }
        Ok(Self::filter_players(cached, query))
    }

    fn filter_players(players: Vec<PlayerRecord>, query: &str) -> Vec<PlayerRecord> {
        let mut hits: Vec<PlayerRecord> = players
            .into_iter()
            .filter(|p| contains_ignore_case(&p.name, query) || contains_ignore_case(&p.team, query))
            .collect();
        hits.sort_by(|a, b| cmp_ignore_case(&a.name, &b.name));
        hits
    }

    // =========================================================================
    // Connectivity-driven sync
    // =========================================================================

    /// Watch connectivity transitions and run a debounced sync pass
    /// whenever the device comes back online. Rapid flapping within the
    /// debounce window collapses to at most one pass (last event wins).
    pub fn start_auto_sync(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut rx = inner.connectivity.clone();
            let mut was_online = *rx.borrow();
            let mut pending: Option<JoinHandle<()>> = None;

            while rx.changed().await.is_ok() {
                let online = *rx.borrow();
                if let Some(task) = pending.take() {
                    task.abort();
                }
                if online && !was_online {
                    debug!("Connectivity regained, debouncing sync");
                    let inner = inner.clone();
                    pending = Some(tokio::spawn(async move {
                        sleep(CONNECTIVITY_DEBOUNCE).await;
                        inner.sync_pass();
                    }));
                }
                was_online = online;
            }
        })
    }

    // =========================================================================
    // Deduplicated network fetches
    // =========================================================================

    async fn refresh_player_shared(
        &self,
        player_id: &str,
        priority: Priority,
    ) -> Result<PlayerRecord, DataError> {
        let key = format!("player:{}", player_id);
        let inner = self.inner.clone();
        let id = player_id.to_string();
        self.inner
            .inflight_player
            .join_or_start(&key, move || RepoInner::player_fetch(inner, id, priority))
            .await
    }

    async fn refresh_roster_shared(
        &self,
        priority: Priority,
    ) -> Result<Vec<PlayerRecord>, DataError> {
        let inner = self.inner.clone();
        self.inner
            .inflight_roster
            .join_or_start("players:all", move || {
                RepoInner::roster_fetch(inner, priority)
            })
            .await
    }

    async fn refresh_stats_shared(
        &self,
        player_id: &str,
        season: u16,
        priority: Priority,
    ) -> Result<Vec<StatRecord>, DataError> {
        let key = format!("stats:{}:{}", player_id, season);
        let inner = self.inner.clone();
        let id = player_id.to_string();
        self.inner
            .inflight_stats
            .join_or_start(&key, move || {
                RepoInner::stats_fetch(inner, id, season, priority)
            })
            .await
    }

    async fn refresh_matchups_shared(
        &self,
        player_id: &str,
        season: u16,
        priority: Priority,
    ) -> Result<Vec<MatchupRecord>, DataError> {
        let key = format!("matchups:{}:{}", player_id, season);
        let inner = self.inner.clone();
        let id = player_id.to_string();
        self.inner
            .inflight_matchups
            .join_or_start(&key, move || {
                RepoInner::matchups_fetch(inner, id, season, priority)
            })
            .await
    }
}

impl<R: RemoteSource> RepoInner<R> {
    fn online(&self) -> bool {
        *self.connectivity.borrow()
    }

    fn read_cached_player(&self, player_id: &str) -> Option<PlayerRecord> {
        match self.cache.store().player(player_id) {
            Ok(cached) => cached,
            Err(err) => {
                warn!(player_id, error = %err, "Cache read failed, treating as miss");
                None
            }
        }
    }

    fn read_cached_players(&self) -> Vec<PlayerRecord> {
        match self.cache.store().players() {
            Ok(players) => players,
            Err(err) => {
                warn!(error = %err, "Cache read failed, treating as empty");
                Vec::new()
            }
        }
    }

    /// Enforce the minimum spacing between outbound calls. The sleep
    /// happens while the lock is held, serializing all callers.
    async fn throttle(&self) {
        let mut last = self.throttle.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_SPACING {
                sleep(MIN_REQUEST_SPACING - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Best-effort housekeeping after connectivity returns: expire
    /// stale families and re-check the bound. Per-key refresh stays
    /// lazy so a reconnect does not stampede the upstream.
    fn sync_pass(&self) {
        info!("Running connectivity sync pass");
        match self.cache.clear_expired() {
            Ok(expired) => {
                if let Err(err) = self.cache.size_check_and_evict() {
                    warn!(error = %err, "Size check failed during sync pass");
                }
                let _ = self.events.send(RepoEvent::SyncCompleted { expired });
            }
            Err(err) => warn!(error = %err, "Sync pass failed"),
        }
    }

    fn player_fetch(
        inner: Arc<Self>,
        player_id: String,
        priority: Priority,
    ) -> BoxFuture<'static, Result<PlayerRecord, DataError>> {
        async move {
            inner.throttle().await;
            let request_id = format!("player:{}", player_id);
            let remote = inner.remote.clone();
            let id = player_id.clone();
            let fetched = inner
                .limiter
                .submit(&request_id, priority, move || {
                    let remote = remote.clone();
                    let id = id.clone();
                    async move { remote.fetch_player(&id).await }
                })
                .await?;

            let record = match inner.cache.put_players(vec![fetched.clone()]) {
                Ok(mut stamped) => stamped.pop().unwrap_or(fetched),
                Err(err) => {
                    warn!(player_id = %player_id, error = %err, "Failed to cache player");
                    fetched
                }
            };
            let _ = inner.events.send(RepoEvent::PlayerUpdated(record.id.clone()));
            Ok(record)
        }
        .boxed()
    }

    fn roster_fetch(
        inner: Arc<Self>,
        priority: Priority,
    ) -> BoxFuture<'static, Result<Vec<PlayerRecord>, DataError>> {
        async move {
            inner.throttle().await;
            let remote = inner.remote.clone();
            let fetched = inner
                .limiter
                .submit("players:all", priority, move || {
                    let remote = remote.clone();
                    async move { remote.fetch_player_list().await }
                })
                .await?;

            let roster = match inner.cache.put_players(fetched.clone()) {
                Ok(stamped) => stamped,
                Err(err) => {
                    warn!(error = %err, "Failed to cache roster");
                    fetched
                }
            };
            let _ = inner.events.send(RepoEvent::PlayersRefreshed(roster.len()));
            Ok(roster)
        }
        .boxed()
    }

    fn stats_fetch(
        inner: Arc<Self>,
        player_id: String,
        season: u16,
        priority: Priority,
    ) -> BoxFuture<'static, Result<Vec<StatRecord>, DataError>> {
        async move {
            inner.throttle().await;
            let request_id = format!("stats:{}:{}", player_id, season);
            let remote = inner.remote.clone();
            let id = player_id.clone();
            let rows = inner
                .limiter
                .submit(&request_id, priority, move || {
                    let remote = remote.clone();
                    let id = id.clone();
                    async move { remote.fetch_stats(&id, season).await }
                })
                .await?;

            if let Err(err) = inner.cache.put_stats(&rows) {
                warn!(player_id = %player_id, error = %err, "Failed to cache stats");
            }
            let _ = inner
                .events
                .send(RepoEvent::StatsUpdated(player_id.clone()));
            Ok(rows)
        }
        .boxed()
    }

    fn matchups_fetch(
        inner: Arc<Self>,
        player_id: String,
        season: u16,
        priority: Priority,
    ) -> BoxFuture<'static, Result<Vec<MatchupRecord>, DataError>> {
        async move {
            inner.throttle().await;
            let request_id = format!("matchups:{}:{}", player_id, season);
            let remote = inner.remote.clone();
            let id = player_id.clone();
            let rows = inner
                .limiter
                .submit(&request_id, priority, move || {
                    let remote = remote.clone();
                    let id = id.clone();
                    async move { remote.fetch_matchups(&id, season).await }
                })
                .await?;

            if let Err(err) = inner.cache.put_matchups(&rows) {
                warn!(player_id = %player_id, error = %err, "Failed to cache matchups");
            }
            let _ = inner
                .events
                .send(RepoEvent::MatchupsUpdated(player_id.clone()));
            Ok(rows)
        }
        .boxed()
    }
}

// ============================================================================
// Tests
// ============================================================================
