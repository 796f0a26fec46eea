// Allow dead code: API response structs have fields for completeness
#![allow(dead_code)]

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Midpoint of the 0-10 rating scale; placeholders sit here.
pub const NEUTRAL_RATING: f64 = 5.0;

/// Fantasy points corresponding to one rating point.
/// 20 points is an elite outing, which maps to a 10.0 rating.
const POINTS_PER_RATING_POINT: f64 = 2.0;

/// Derive a 0-10 performance rating from a fantasy point total.
pub fn performance_rating(fantasy_points: f64) -> f64 {
    (fantasy_points / POINTS_PER_RATING_POINT).clamp(0.0, 10.0)
}

/// One historical game against a specific opponent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupRecord {
    pub player_id: String,
    /// Opponent team abbreviation, e.g. "GB".
    pub opponent: String,
    pub season: u16,
    pub week: u8,
    /// Game date as YYYY-MM-DD.
    pub game_date: String,
    pub fantasy_points: f64,
    /// Derived 0-10 performance rating for this game.
    pub rating: f64,
}

impl MatchupRecord {
    /// Neutral-rated entry, synthesized when the upstream has no game log
    /// for a player/opponent pair.
    pub fn placeholder(player_id: &str, opponent: &str, season: u16) -> Self {
        Self {
            player_id: player_id.to_string(),
            opponent: opponent.to_string(),
            season,
            week: 0,
            game_date: String::new(),
            fantasy_points: 0.0,
            rating: NEUTRAL_RATING,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.week == 0 && self.fantasy_points == 0.0 && self.rating == NEUTRAL_RATING
    }
}

/// Minimum games against an opponent before the sample is trusted.
const MIN_SAMPLE_GAMES: usize = 3;

/// Aggregated matchup history for one player against one opponent.
///
/// Always best-effort: a thin sample sets `insufficient_sample` rather
/// than failing the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupReport {
    pub player_id: String,
    pub opponent: String,
    pub games: Vec<MatchupRecord>,
    pub average_points: f64,
    pub rating: f64,
    pub insufficient_sample: bool,
}

impl MatchupReport {
    /// Build a report from whatever history is available.
    pub fn from_games(player_id: &str, opponent: &str, games: Vec<MatchupRecord>) -> Self {
        let real: Vec<&MatchupRecord> = games.iter().filter(|g| !g.is_placeholder()).collect();
        let (average_points, rating) = if real.is_empty() {
            (0.0, NEUTRAL_RATING)
        } else {
            let avg = real.iter().map(|g| g.fantasy_points).sum::<f64>() / real.len() as f64;
            (avg, performance_rating(avg))
        };

        Self {
            player_id: player_id.to_string(),
            opponent: opponent.to_string(),
            insufficient_sample: real.len() < MIN_SAMPLE_GAMES,
            games,
            average_points,
            rating,
        }
    }

    pub fn sample_size(&self) -> usize {
        self.games.iter().filter(|g| !g.is_placeholder()).count()
    }

    /// Semantic condition carried alongside the data, never instead of it.
    pub fn warning(&self) -> Option<DataError> {
        if self.insufficient_sample {
            Some(DataError::InsufficientData {
                got: self.sample_size(),
                want: MIN_SAMPLE_GAMES,
            })
        } else {
            None
        }
    }
}

/// Raw game log payload from the upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiGameLog {
    #[serde(rename = "playerID", alias = "playerId")]
    pub player_id: Option<String>,
    #[serde(rename = "opponent", alias = "opp")]
    pub opponent: Option<String>,
    pub season: Option<u16>,
    pub week: Option<u8>,
    #[serde(rename = "gameDate")]
    pub game_date: Option<String>,
    #[serde(rename = "fantasyPoints", default)]
    pub fantasy_points: Option<f64>,
}

impl ApiGameLog {
    pub fn into_record(self, player_id: &str, season: u16) -> MatchupRecord {
        let points = self.fantasy_points.unwrap_or(0.0);
        MatchupRecord {
            player_id: player_id.to_string(),
            opponent: self.opponent.unwrap_or_default(),
            season,
            week: self.week.unwrap_or(0),
            game_date: self.game_date.unwrap_or_default(),
            fantasy_points: points,
            rating: performance_rating(points),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(points: f64, week: u8) -> MatchupRecord {
        MatchupRecord {
            player_id: "123".to_string(),
            opponent: "GB".to_string(),
            season: 2024,
            week,
            game_date: format!("2024-09-{:02}", week),
            fantasy_points: points,
            rating: performance_rating(points),
        }
    }

    #[test]
    fn test_performance_rating_scale() {
        assert_eq!(performance_rating(0.0), 0.0);
        assert_eq!(performance_rating(10.0), NEUTRAL_RATING);
        assert_eq!(performance_rating(20.0), 10.0);
        // Monster games clamp at the ceiling
        assert_eq!(performance_rating(45.0), 10.0);
        assert_eq!(performance_rating(-3.0), 0.0);
    }

    #[test]
    fn test_report_aggregation() {
        let report =
            MatchupReport::from_games("123", "GB", vec![game(10.0, 1), game(20.0, 5), game(15.0, 12)]);
        assert_eq!(report.average_points, 15.0);
        assert_eq!(report.rating, performance_rating(15.0));
        assert!(!report.insufficient_sample);
        assert_eq!(report.sample_size(), 3);
    }

    #[test]
    fn test_thin_sample_is_flagged_not_failed() {
        let report = MatchupReport::from_games("123", "GB", vec![game(22.0, 3)]);
        assert!(report.insufficient_sample);
        assert_eq!(report.average_points, 22.0);
        assert_eq!(report.sample_size(), 1);
    }

    #[test]
    fn test_placeholder_only_report_is_neutral() {
        let report = MatchupReport::from_games(
            "123",
            "GB",
            vec![MatchupRecord::placeholder("123", "GB", 2024)],
        );
        assert!(report.insufficient_sample);
        assert_eq!(report.average_points, 0.0);
        assert_eq!(report.rating, NEUTRAL_RATING);
        assert_eq!(report.sample_size(), 0);
    }
}
