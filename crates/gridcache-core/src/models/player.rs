// Allow dead code: API response structs have fields for completeness
#![allow(dead_code)]

use serde::{Deserialize, Serialize};

/// Roster position for an NFL player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Quarterback,
    RunningBack,
    WideReceiver,
    TightEnd,
    Kicker,
    Defense,
    Other,
}

impl Position {
    /// Parse a position string from the API.
    /// Handles variations like "HB"/"FB" for running backs and "D/ST".
    pub fn from_api(s: Option<&str>) -> Self {
        match s {
            Some(pos) => match pos.to_uppercase().as_str() {
                "QB" => Position::Quarterback,
                "RB" | "HB" | "FB" => Position::RunningBack,
                "WR" => Position::WideReceiver,
                "TE" => Position::TightEnd,
                "K" | "PK" => Position::Kicker,
                "DEF" | "DST" | "D/ST" => Position::Defense,
                _ => Position::Other,
            },
            None => Position::Other,
        }
    }

    /// Get the abbreviated display name for this position.
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Position::Quarterback => "QB",
            Position::RunningBack => "RB",
            Position::WideReceiver => "WR",
            Position::TightEnd => "TE",
            Position::Kicker => "K",
            Position::Defense => "DEF",
            Position::Other => "FLEX",
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Injury/availability designation, most severe last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InjuryStatus {
    Healthy,
    Questionable,
    Doubtful,
    Out,
    InjuredReserve,
    Unknown,
}

impl InjuryStatus {
    /// Parse an injury designation string from the API.
    /// Upstream wording varies ("IR", "Injured Reserve", "O", "Out").
    pub fn from_api(s: Option<&str>) -> Self {
        match s {
            None => InjuryStatus::Healthy,
            Some(status) => {
                let lower = status.to_lowercase();
                if lower.is_empty() || lower == "healthy" || lower == "active" {
                    InjuryStatus::Healthy
                } else if lower.contains("questionable") || lower == "q" {
                    InjuryStatus::Questionable
                } else if lower.contains("doubtful") || lower == "d" {
                    InjuryStatus::Doubtful
                } else if lower.contains("reserve") || lower == "ir" {
                    InjuryStatus::InjuredReserve
                } else if lower.contains("out") || lower == "o" {
                    InjuryStatus::Out
                } else {
                    InjuryStatus::Unknown
                }
            }
        }
    }

    /// Whether the player is expected to suit up at all.
    pub fn may_play(&self) -> bool {
        matches!(
            self,
            InjuryStatus::Healthy | InjuryStatus::Questionable | InjuryStatus::Doubtful
        )
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            InjuryStatus::Healthy => "Healthy",
            InjuryStatus::Questionable => "Questionable",
            InjuryStatus::Doubtful => "Doubtful",
            InjuryStatus::Out => "Out",
            InjuryStatus::InjuredReserve => "Injured Reserve",
            InjuryStatus::Unknown => "Unknown",
        }
    }
}

/// A cached player. The `last_updated` stamp is the freshness signal for
/// the player's whole record family (stats and matchups inherit it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: String,
    pub name: String,
    pub position: Position,
    pub team: String,
    pub injury_status: InjuryStatus,
    pub active: bool,
    /// Epoch millis of the last successful cache write for this player.
    pub last_updated: i64,
}

impl PlayerRecord {
    pub fn display_name(&self) -> String {
        format!("{} ({} - {})", self.name, self.position, self.team)
    }
}

// API response wrappers

/// Response from the bulk player listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerListResponse {
    #[serde(default, alias = "body", alias = "data")]
    pub players: Vec<ApiPlayer>,
}

/// Raw player payload. The upstream may return only basic identity and
/// status fields, so everything beyond the id is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPlayer {
    #[serde(rename = "playerID", alias = "playerId", alias = "id")]
    pub player_id: String,
    #[serde(rename = "longName", alias = "displayName")]
    pub long_name: Option<String>,
    #[serde(rename = "pos", alias = "position")]
    pub pos: Option<String>,
    pub team: Option<String>,
    #[serde(rename = "injuryStatus", alias = "injuryDesignation")]
    pub injury_status: Option<String>,
    #[serde(rename = "isActive", alias = "active")]
    pub is_active: Option<bool>,
}

impl ApiPlayer {
    /// Convert to a PlayerRecord, stamping the given write time.
    pub fn into_record(self, last_updated: i64) -> PlayerRecord {
        PlayerRecord {
            name: self
                .long_name
                .unwrap_or_else(|| format!("Player {}", self.player_id)),
            position: Position::from_api(self.pos.as_deref()),
            team: self.team.unwrap_or_else(|| "FA".to_string()),
            injury_status: InjuryStatus::from_api(self.injury_status.as_deref()),
            active: self.is_active.unwrap_or(true),
            last_updated,
            id: self.player_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_from_api() {
        assert_eq!(Position::from_api(Some("QB")), Position::Quarterback);
        assert_eq!(Position::from_api(Some("hb")), Position::RunningBack);
        assert_eq!(Position::from_api(Some("D/ST")), Position::Defense);
        assert_eq!(Position::from_api(Some("LS")), Position::Other);
        assert_eq!(Position::from_api(None), Position::Other);
    }

    #[test]
    fn test_injury_status_from_api() {
        assert_eq!(InjuryStatus::from_api(None), InjuryStatus::Healthy);
        assert_eq!(InjuryStatus::from_api(Some("")), InjuryStatus::Healthy);
        assert_eq!(
            InjuryStatus::from_api(Some("Questionable")),
            InjuryStatus::Questionable
        );
        assert_eq!(
            InjuryStatus::from_api(Some("IR")),
            InjuryStatus::InjuredReserve
        );
        assert_eq!(
            InjuryStatus::from_api(Some("Injured Reserve")),
            InjuryStatus::InjuredReserve
        );
        assert_eq!(InjuryStatus::from_api(Some("Out")), InjuryStatus::Out);
        assert_eq!(
            InjuryStatus::from_api(Some("day-to-day")),
            InjuryStatus::Unknown
        );
    }

    #[test]
    fn test_may_play() {
        assert!(InjuryStatus::Healthy.may_play());
        assert!(InjuryStatus::Questionable.may_play());
        assert!(!InjuryStatus::Out.may_play());
        assert!(!InjuryStatus::InjuredReserve.may_play());
    }

    #[test]
    fn test_api_player_into_record() {
        let json = r#"{"playerID": "4034953", "longName": "Justin Jefferson", "pos": "WR", "team": "MIN", "injuryStatus": "Questionable", "isActive": true}"#;
        let api: ApiPlayer = serde_json::from_str(json).expect("parse player");
        let record = api.into_record(1_700_000_000_000);

        assert_eq!(record.id, "4034953");
        assert_eq!(record.name, "Justin Jefferson");
        assert_eq!(record.position, Position::WideReceiver);
        assert_eq!(record.team, "MIN");
        assert_eq!(record.injury_status, InjuryStatus::Questionable);
        assert!(record.active);
        assert_eq!(record.last_updated, 1_700_000_000_000);
    }

    #[test]
    fn test_api_player_minimal_payload() {
        // Upstream may return only the id; conversion fills sensible defaults.
        let json = r#"{"playerID": "123"}"#;
        let api: ApiPlayer = serde_json::from_str(json).expect("parse minimal player");
        let record = api.into_record(0);

        assert_eq!(record.name, "Player 123");
        assert_eq!(record.position, Position::Other);
        assert_eq!(record.team, "FA");
        assert_eq!(record.injury_status, InjuryStatus::Healthy);
        assert!(record.active);
    }
}
