//! API client for the upstream sports data service.
//!
//! This module provides the `SportsApiClient` struct for making
//! requests to fetch player identity, stat, and game log data.
//!
//! The upstream is a public API with no authentication. It also makes
//! no guarantee of stat or game log endpoints - those calls may come
//! back empty, and callers are expected to synthesize placeholders.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::DataError;
use crate::models::{ApiGameLog, ApiPlayer, ApiStatLine, MatchupRecord, PlayerRecord, StatRecord};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// One network attempt against the upstream. Implementations must not
/// retry - the rate limiter owns retry policy.
#[async_trait]
pub trait RemoteSource: Send + Sync + 'static {
    async fn fetch_player(&self, player_id: &str) -> Result<PlayerRecord, DataError>;

    /// Bulk roster listing. The upstream has no search endpoint, so
    /// search is a client-side filter over this.
    async fn fetch_player_list(&self) -> Result<Vec<PlayerRecord>, DataError>;

    async fn fetch_stats(&self, player_id: &str, season: u16) -> Result<Vec<StatRecord>, DataError>;

    async fn fetch_matchups(
        &self,
        player_id: &str,
        season: u16,
    ) -> Result<Vec<MatchupRecord>, DataError>;
}

/// API client for the sports data service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SportsApiClient {
    client: Client,
    base_url: String,
}

impl SportsApiClient {
    /// Create a new API client against the given base URL.
    pub fn new(base_url: &str) -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DataError::Client(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Perform one GET attempt and return the raw body on success.
    async fn get_text(&self, url: &str) -> Result<String, DataError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DataError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::from_status(status, &body, retry_after));
        }

        let text = response
            .text()
            .await
            .map_err(|e| DataError::from_transport(&e))?;

        if text.trim().is_empty() || text.trim() == "null" {
            return Err(DataError::EmptyResponse);
        }

        Ok(text)
    }
}

#[async_trait]
impl RemoteSource for SportsApiClient {
    async fn fetch_player(&self, player_id: &str) -> Result<PlayerRecord, DataError> {
        let url = format!("{}/players/{}", self.base_url, player_id);
        let text = self.get_text(&url).await?;
        debug!(player_id, "Player response received");

        let now = chrono::Utc::now().timestamp_millis();

        // Try parsing as a bare player first, then as a wrapped object
        if let Ok(api) = serde_json::from_str::<ApiPlayer>(&text) {
            return Ok(api.into_record(now));
        }

        #[derive(Deserialize)]
        struct PlayerWrapper {
            #[serde(alias = "body", alias = "data")]
            player: ApiPlayer,
        }

        match serde_json::from_str::<PlayerWrapper>(&text) {
            Ok(wrapper) => Ok(wrapper.player.into_record(now)),
            Err(e) => {
                warn!(player_id, error = %e, "Failed to parse player response");
                Err(DataError::Client(format!(
                    "Unparseable player payload: {}",
                    e
                )))
            }
        }
    }

    async fn fetch_player_list(&self) -> Result<Vec<PlayerRecord>, DataError> {
        let url = format!("{}/players", self.base_url);
        let text = self.get_text(&url).await?;
        debug!("Player list response received");

        let now = chrono::Utc::now().timestamp_millis();

        // Try to parse as array directly first, then as wrapped object
        let players: Vec<ApiPlayer> = if let Ok(list) = serde_json::from_str::<Vec<ApiPlayer>>(&text)
        {
            list
        } else {
            serde_json::from_str::<crate::models::PlayerListResponse>(&text)
                .map_err(|e| DataError::Client(format!("Unparseable player list: {}", e)))?
                .players
        };

        if players.is_empty() {
            return Err(DataError::EmptyResponse);
        }

        Ok(players.into_iter().map(|p| p.into_record(now)).collect())
    }

    async fn fetch_stats(&self, player_id: &str, season: u16) -> Result<Vec<StatRecord>, DataError> {
        let url = format!(
            "{}/players/{}/stats?season={}",
            self.base_url, player_id, season
        );
        let text = self.get_text(&url).await?;
        debug!(player_id, season, "Stats response received");

        let lines: Vec<ApiStatLine> = if let Ok(list) = serde_json::from_str::<Vec<ApiStatLine>>(&text)
        {
            list
        } else {
            #[derive(Deserialize)]
            struct StatsWrapper {
                #[serde(default, alias = "body", alias = "stats", alias = "data")]
                stats: Vec<ApiStatLine>,
            }
            serde_json::from_str::<StatsWrapper>(&text)
                .map(|w| w.stats)
                .unwrap_or_default()
        };

        if lines.is_empty() {
            // Successful transport, no stat detail for this player
            return Err(DataError::EmptyResponse);
        }

        Ok(lines
            .into_iter()
            .map(|l| l.into_record(player_id, season))
            .collect())
    }

    async fn fetch_matchups(
        &self,
        player_id: &str,
        season: u16,
    ) -> Result<Vec<MatchupRecord>, DataError> {
        let url = format!(
            "{}/players/{}/games?season={}",
            self.base_url, player_id, season
        );
        let text = self.get_text(&url).await?;
        debug!(player_id, season, "Game log response received");

        let logs: Vec<ApiGameLog> = if let Ok(list) = serde_json::from_str::<Vec<ApiGameLog>>(&text) {
            list
        } else {
            #[derive(Deserialize)]
            struct GamesWrapper {
                #[serde(default, alias = "body", alias = "games", alias = "data")]
                games: Vec<ApiGameLog>,
            }
            serde_json::from_str::<GamesWrapper>(&text)
                .map(|w| w.games)
                .unwrap_or_default()
        };

        if logs.is_empty() {
            return Err(DataError::EmptyResponse);
        }

        Ok(logs
            .into_iter()
            .map(|l| l.into_record(player_id, season))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = SportsApiClient::new("https://api.example.com/v1/").expect("client");
        assert_eq!(client.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_parse_wrapped_player_list() {
        let json = r#"{"body": [
            {"playerID": "1", "longName": "Josh Allen", "pos": "QB", "team": "BUF"},
            {"playerID": "2", "longName": "Saquon Barkley", "pos": "RB", "team": "PHI"}
        ]}"#;

        let parsed: crate::models::PlayerListResponse =
            serde_json::from_str(json).expect("parse list wrapper");
        assert_eq!(parsed.players.len(), 2);

        let record = parsed.players[0].clone().into_record(0);
        assert_eq!(record.name, "Josh Allen");
        assert_eq!(record.position, Position::Quarterback);
    }

    #[test]
    fn test_parse_bare_stat_array() {
        let json = r#"[{"playerID": "1", "week": 1, "fantasyPoints": "12.5"}]"#;
        let lines: Vec<ApiStatLine> = serde_json::from_str(json).expect("parse stat array");
        assert_eq!(lines.len(), 1);
        let row = lines[0].clone().into_record("1", 2025);
        assert_eq!(row.fantasy_points, 12.5);
        assert_eq!(row.season, 2025);
    }
}
