use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Smallest table a game is created with.
pub const MIN_PLAYERS: usize = 3;
/// Seconds every final-round player gets to answer.
pub const FINAL_ANSWER_SECS: u64 = 30;
/// Seconds a dispute vote stays open.
pub const DISPUTE_SECS: u64 = 60;
/// Seconds every final-round player gets to wager.
pub const FINAL_WAGER_SECS: u64 = 30;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_players() -> usize {
    MIN_PLAYERS
}

/// Options chosen by whoever creates a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Play the second round before the final one.
    #[serde(default = "default_true")]
    pub full_game: bool,
    /// Wrong answers subtract the clue value.
    #[serde(default = "default_true")]
    pub penalty: bool,
    /// Bots seated at creation.
    #[serde(default)]
    #[validate(range(max = 2, message = "bots must be between 0 and 2"))]
    pub bots: u8,
    /// Requested table size.
    #[serde(default = "default_players")]
    pub players: usize,
    #[serde(default = "default_timeout")]
    #[validate(range(min = 3, max = 60, message = "timeouts must be between 3 and 60 seconds"))]
    pub pick_timeout: u64,
    #[serde(default = "default_timeout")]
    #[validate(range(min = 3, max = 60, message = "timeouts must be between 3 and 60 seconds"))]
    pub buzz_timeout: u64,
    #[serde(default = "default_timeout")]
    #[validate(range(min = 3, max = 60, message = "timeouts must be between 3 and 60 seconds"))]
    pub answer_timeout: u64,
    /// Accepted and validated for clients that send it, but dispute votes
    /// always run on the fixed `DISPUTE_SECS` window.
    #[serde(default = "default_timeout")]
    #[validate(range(min = 3, max = 60, message = "timeouts must be between 3 and 60 seconds"))]
    pub vote_timeout: u64,
    #[serde(default = "default_timeout")]
    #[validate(range(min = 3, max = 60, message = "timeouts must be between 3 and 60 seconds"))]
    pub wager_timeout: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            full_game: true,
            penalty: true,
            bots: 0,
            players: MIN_PLAYERS,
            pick_timeout: DEFAULT_TIMEOUT_SECS,
            buzz_timeout: DEFAULT_TIMEOUT_SECS,
            answer_timeout: DEFAULT_TIMEOUT_SECS,
            vote_timeout: DEFAULT_TIMEOUT_SECS,
            wager_timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GameConfig {
    /// Seats available, `min(max_players, max(3, players))`.
    pub fn capacity(&self, max_players: usize) -> usize {
        self.players.max(MIN_PLAYERS).min(max_players.max(MIN_PLAYERS))
    }

    pub fn pick(&self) -> Duration {
        Duration::from_secs(self.pick_timeout)
    }

    pub fn buzz(&self) -> Duration {
        Duration::from_secs(self.buzz_timeout)
    }

    pub fn answer(&self) -> Duration {
        Duration::from_secs(self.answer_timeout)
    }

    pub fn wager(&self) -> Duration {
        Duration::from_secs(self.wager_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_clamped() {
        let mut config = GameConfig::default();
        assert_eq!(config.capacity(6), 3);
        config.players = 1;
        assert_eq!(config.capacity(6), 3);
        config.players = 5;
        assert_eq!(config.capacity(6), 5);
        config.players = 12;
        assert_eq!(config.capacity(6), 6);
    }

    #[test]
    fn rejects_out_of_range_options() {
        assert!(GameConfig::default().validate().is_ok());

        let config = GameConfig {
            bots: 3,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GameConfig {
            buzz_timeout: 2,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GameConfig {
            wager_timeout: 61,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: GameConfig = serde_json::from_str(r#"{"penalty": false}"#).unwrap();
        assert!(!config.penalty);
        assert!(config.full_game);
        assert_eq!(config.answer_timeout, 30);
    }
}
