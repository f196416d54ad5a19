use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::side_channel::PING,
    state::{
        game_config::GameConfig,
        state_machine::{GamePhase, RoundState},
    },
};

/// Full state of a game as rendered by clients after every mutation.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Game name, also used as the join code.
    pub name: String,
    #[schema(value_type = u8)]
    pub state: GamePhase,
    #[schema(value_type = u8)]
    pub round: RoundState,
    pub players: Vec<PlayerView>,
    pub first_round: Vec<CategoryView>,
    pub second_round: Vec<CategoryView>,
    pub cur_question: Option<QuestionView>,
    pub final_question: FinalQuestionView,
    pub ans_correctness: bool,
    pub guessed_wrong: Vec<String>,
    pub passed: Vec<String>,
    pub paused: bool,
    /// RFC 3339 timestamp of the pause.
    pub paused_at: Option<String>,
    /// The pause was caused by a lost connection.
    pub disconnected: bool,
    /// Only filled once the active question is closed.
    pub official_answer: Option<String>,
    pub penalty: bool,
    pub config: GameConfig,
    pub last_picker: Option<String>,
}

impl GameSnapshot {
    /// Record of `player_id` within this snapshot.
    pub fn player(&self, player_id: &str) -> Option<&PlayerView> {
        self.players.iter().find(|player| player.id == player_id)
    }
}

/// Public view of a seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub score: i64,
    pub can_pick: bool,
    pub can_buzz: bool,
    pub can_answer: bool,
    pub can_wager: bool,
    pub can_dispute: bool,
    pub final_wager: i64,
    pub final_answer: String,
    pub final_correct: bool,
    pub final_protestors: Vec<String>,
    pub play_again: bool,
    pub bot: bool,
    pub connected: bool,
}

/// One column of the board.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub title: String,
    pub questions: Vec<CellView>,
}

/// A board cell; its clue stays hidden until picked.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CellView {
    pub category: String,
    pub value: i64,
    pub can_choose: bool,
}

/// The clue currently in play.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub category: String,
    /// Empty while wagers are collected.
    pub clue: String,
    pub comments: String,
    pub value: i64,
    pub daily_double: bool,
    pub answers: Vec<AnswerView>,
    pub cur_ans: Option<AnswerView>,
    pub cur_disputed: Option<AnswerView>,
}

/// A judged submission.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerView {
    pub player_id: String,
    pub answer: String,
    pub correct: bool,
    pub has_disputed: bool,
    pub overturned: bool,
    pub bot: bool,
}

/// Final clue category, announced before wagering.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinalQuestionView {
    pub category: String,
}

/// Frame pushed to a play socket.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResponse<'a> {
    pub code: u16,
    pub message: &'a str,
    /// Only set on keep-alive frames, to the `ping` sentinel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<&'a GameSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cur_player: Option<PlayerView>,
}

impl PlayResponse<'static> {
    pub fn ping() -> Self {
        Self {
            code: 200,
            message: PING,
            name: Some(PING),
            game: None,
            cur_player: None,
        }
    }
}

/// Entry of the public and private game listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub name: String,
    pub players: usize,
    pub capacity: usize,
    #[schema(value_type = u8)]
    pub state: GamePhase,
    pub private: bool,
}
