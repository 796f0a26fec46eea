// Allow dead code: API response structs have fields for completeness
#![allow(dead_code)]

use serde::{Deserialize, Serialize};

/// One statistical line for a player. `week == None` is the season
/// aggregate row; weekly rows carry their week number. Rows are upserted
/// by the (player, season, week) composite key - new granularities are
/// added alongside, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub player_id: String,
    pub season: u16,
    pub week: Option<u8>,
    pub fantasy_points: f64,
    pub passing_yards: f64,
    pub rushing_yards: f64,
    pub receiving_yards: f64,
    pub touchdowns: u32,
    /// Epoch millis of the game (or season start for aggregate rows).
    pub game_time: i64,
}

impl StatRecord {
    /// Composite key identifying this row.
    pub fn key(&self) -> (&str, u16, Option<u8>) {
        (&self.player_id, self.season, self.week)
    }

    /// Zero-valued season-aggregate line, synthesized when the upstream
    /// has no detailed stat data for a player.
    pub fn placeholder(player_id: &str, season: u16) -> Self {
        Self {
            player_id: player_id.to_string(),
            season,
            week: None,
            fantasy_points: 0.0,
            passing_yards: 0.0,
            rushing_yards: 0.0,
            receiving_yards: 0.0,
            touchdowns: 0,
            game_time: 0,
        }
    }

    /// Whether this row was synthesized rather than fetched.
    pub fn is_placeholder(&self) -> bool {
        self.fantasy_points == 0.0
            && self.passing_yards == 0.0
            && self.rushing_yards == 0.0
            && self.receiving_yards == 0.0
            && self.touchdowns == 0
            && self.game_time == 0
    }

    pub fn total_yards(&self) -> f64 {
        self.passing_yards + self.rushing_yards + self.receiving_yards
    }
}

/// Raw stat payload from the upstream. Numeric fields arrive as strings
/// on some endpoints, so parsing is lenient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiStatLine {
    #[serde(rename = "playerID", alias = "playerId")]
    pub player_id: Option<String>,
    pub season: Option<u16>,
    pub week: Option<u8>,
    #[serde(rename = "fantasyPoints", default)]
    pub fantasy_points: Option<serde_json::Value>,
    #[serde(rename = "passYds", alias = "passingYards", default)]
    pub pass_yds: Option<serde_json::Value>,
    #[serde(rename = "rushYds", alias = "rushingYards", default)]
    pub rush_yds: Option<serde_json::Value>,
    #[serde(rename = "recYds", alias = "receivingYards", default)]
    pub rec_yds: Option<serde_json::Value>,
    #[serde(rename = "totalTD", alias = "touchdowns", default)]
    pub total_td: Option<serde_json::Value>,
    #[serde(rename = "gameTime", alias = "gameEpoch", default)]
    pub game_time: Option<serde_json::Value>,
}

/// Parse a numeric field that may arrive as a JSON number or a string.
fn lenient_f64(value: &Option<serde_json::Value>) -> f64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl ApiStatLine {
    /// Convert to a StatRecord for the given player and season, which take
    /// precedence over whatever the payload claims.
    pub fn into_record(self, player_id: &str, season: u16) -> StatRecord {
        StatRecord {
            player_id: player_id.to_string(),
            season,
            week: self.week,
            fantasy_points: lenient_f64(&self.fantasy_points),
            passing_yards: lenient_f64(&self.pass_yds),
            rushing_yards: lenient_f64(&self.rush_yds),
            receiving_yards: lenient_f64(&self.rec_yds),
            touchdowns: lenient_f64(&self.total_td) as u32,
            game_time: lenient_f64(&self.game_time) as i64,
        }
    }
}
