use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{game::GameSnapshot, validation::validate_player_name},
    state::game_config::GameConfig,
};

/// Request to take a seat, sent as the first join frame or as a REST body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(alias = "name")]
    pub player_name: String,
    /// Code of an existing game to join; ignored when creating one.
    #[serde(default)]
    pub game_name: Option<String>,
    /// Create a new private game instead of joining a public one.
    #[serde(default)]
    pub private: bool,
    /// Options used when this request creates the game.
    #[serde(flatten)]
    pub config: GameConfig,
}

impl Validate for JoinRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_player_name(&self.player_name) {
            errors.add("playerName", e);
        }
        if let Err(config_errors) = self.config.validate() {
            errors.merge_self("config", Err(config_errors));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Reply to a successful join: the bearer token plus the game as seen on arrival.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    pub code: u16,
    pub token: String,
    pub message: String,
    pub game: GameSnapshot,
}

/// Reply of the authenticated REST actions.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<GameSnapshot>,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>, game: Option<GameSnapshot>) -> Self {
        Self {
            code: 200,
            message: message.into(),
            game,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn config_fields_sit_beside_the_name() {
        let request: JoinRequest = serde_json::from_value(json!({
            "playerName": "Ann",
            "private": true,
            "penalty": false,
            "bots": 1,
            "pickTimeout": 10
        }))
        .unwrap();
        assert!(request.private);
        assert!(!request.config.penalty);
        assert_eq!(request.config.bots, 1);
        assert_eq!(request.config.pick_timeout, 10);
        assert_eq!(request.config.buzz_timeout, GameConfig::default().buzz_timeout);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn bad_names_and_configs_are_reported_together() {
        let request: JoinRequest = serde_json::from_value(json!({
            "name": "ping",
            "bots": 3,
            "answerTimeout": 1
        }))
        .unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.errors().contains_key("playerName"));
        assert!(errors.errors().contains_key("config"));
    }
}
