use serde::Deserialize;
use utoipa::ToSchema;

use crate::state::{
    game::{Action, GameError},
    state_machine::GamePhase,
};

/// Codes carried by websocket replies and close frames.
pub mod close_code {
    pub const INFO: u16 = 4100;
    pub const OK: u16 = 4200;
    pub const BAD_REQUEST: u16 = 4400;
    pub const UNAUTHORIZED: u16 = 4401;
    pub const SERVER_ERROR: u16 = 4500;
}

/// Frame sent by a client on its play socket.
///
/// `state` is the phase the client believes current. Which payload field is
/// read depends on it, except for `pause` and `initDispute` which apply in any
/// phase.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayFrame {
    #[schema(value_type = u8)]
    pub state: GamePhase,
    #[serde(default)]
    pub cat_idx: Option<usize>,
    #[serde(default)]
    pub val_idx: Option<usize>,
    #[serde(default)]
    pub is_pass: Option<bool>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub confirm: Option<bool>,
    #[serde(default)]
    pub dispute: Option<bool>,
    #[serde(default)]
    pub wager: Option<i64>,
    #[serde(default)]
    pub protest_for: Option<String>,
    /// `1` pauses, `-1` resumes.
    #[serde(default)]
    pub pause: Option<i8>,
    #[serde(default)]
    pub init_dispute: Option<bool>,
}

impl PlayFrame {
    /// Decode the frame into the phase tag and the action it carries.
    pub fn into_action(self) -> Result<(GamePhase, Action), GameError> {
        let tag = self.state;
        match self.pause {
            Some(1) => return Ok((tag, Action::Pause)),
            Some(-1) => return Ok((tag, Action::Resume)),
            _ => {}
        }
        if self.init_dispute == Some(true) {
            return Ok((tag, Action::InitDispute));
        }

        let action = match tag {
            GamePhase::RecvPick => match (self.cat_idx, self.val_idx) {
                (Some(cat), Some(val)) => Action::Pick { cat, val },
                _ => return Err(missing("catIdx and valIdx")),
            },
            GamePhase::RecvBuzz => Action::Buzz {
                is_pass: self.is_pass.unwrap_or(false),
            },
            GamePhase::RecvAns => Action::Answer(self.answer.ok_or_else(|| missing("answer"))?),
            GamePhase::RecvWager => Action::Wager(self.wager.ok_or_else(|| missing("wager"))?),
            GamePhase::RecvDispute => Action::Vote {
                accept: self
                    .dispute
                    .or(self.confirm)
                    .ok_or_else(|| missing("dispute"))?,
            },
            GamePhase::PostGame => Action::Protest {
                target: self.protest_for.ok_or_else(|| missing("protestFor"))?,
            },
            // Nothing is played in these phases; stale clients get no reply.
            GamePhase::PreGame | GamePhase::BoardIntro => {
                return Err(GameError::NotEligible("play"));
            }
        };
        Ok((tag, action))
    }
}

fn missing(field: &str) -> GameError {
    GameError::InvalidInput(format!("Malformed request: missing {field}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode(value: serde_json::Value) -> Result<(GamePhase, Action), GameError> {
        serde_json::from_value::<PlayFrame>(value).unwrap().into_action()
    }

    #[test]
    fn payload_follows_the_tagged_state() {
        assert_eq!(
            decode(json!({"state": 2, "catIdx": 3, "valIdx": 1})).unwrap(),
            (GamePhase::RecvPick, Action::Pick { cat: 3, val: 1 })
        );
        assert_eq!(
            decode(json!({"state": 3, "isPass": true})).unwrap().1,
            Action::Buzz { is_pass: true }
        );
        assert_eq!(
            decode(json!({"state": 4, "wager": 800})).unwrap().1,
            Action::Wager(800)
        );
        assert_eq!(
            decode(json!({"state": 7, "protestFor": "p2"})).unwrap().1,
            Action::Protest {
                target: "p2".into()
            }
        );
    }

    #[test]
    fn votes_fall_back_to_confirm() {
        assert_eq!(
            decode(json!({"state": 6, "dispute": false, "confirm": true}))
                .unwrap()
                .1,
            Action::Vote { accept: false }
        );
        assert_eq!(
            decode(json!({"state": 6, "confirm": true})).unwrap().1,
            Action::Vote { accept: true }
        );
    }

    #[test]
    fn pause_and_dispute_override_the_state() {
        assert_eq!(
            decode(json!({"state": 3, "pause": 1})).unwrap().1,
            Action::Pause
        );
        assert_eq!(
            decode(json!({"state": 3, "pause": -1, "isPass": true}))
                .unwrap()
                .1,
            Action::Resume
        );
        assert_eq!(
            decode(json!({"state": 2, "initDispute": true})).unwrap().1,
            Action::InitDispute
        );
    }

    #[test]
    fn missing_payloads_are_invalid_input() {
        assert!(matches!(
            decode(json!({"state": 2, "catIdx": 0})),
            Err(GameError::InvalidInput(_))
        ));
        assert!(matches!(
            decode(json!({"state": 5})),
            Err(GameError::InvalidInput(_))
        ));
        assert!(serde_json::from_value::<PlayFrame>(json!({"state": 9})).is_err());
    }

    #[test]
    fn lobby_and_intro_frames_are_silent() {
        for state in [0, 1] {
            let err = decode(json!({"state": state, "catIdx": 0, "valIdx": 0})).unwrap_err();
            assert_eq!(err, GameError::NotEligible("play"));
            assert!(err.is_silent());
        }
        assert_eq!(
            decode(json!({"state": 1, "pause": 1})).unwrap().1,
            Action::Pause
        );
    }
}
