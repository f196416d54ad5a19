use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A single clue as stored in the question repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Clue text read to the players.
    pub clue: String,
    /// Official answer.
    pub answer: String,
    /// Optional host comment shown next to the clue.
    #[serde(default)]
    pub comments: String,
    /// Extra answers accepted for this clue.
    #[serde(default)]
    pub alternatives: Vec<String>,
}

/// A category column: a title and its clues ordered by ascending value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryEntity {
    /// Category title.
    pub title: String,
    /// Clues from cheapest to most expensive.
    pub questions: Vec<QuestionEntity>,
}

/// The final-round clue with its category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinalQuestionEntity {
    /// Category announced before wagering.
    pub category: String,
    /// The clue itself.
    pub question: QuestionEntity,
}

/// One submitted answer as recorded by analytics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyticsAnswerEntity {
    pub player_id: String,
    pub answer: String,
    pub correct: bool,
    pub has_disputed: bool,
    pub overturned: bool,
    pub bot: bool,
}

/// Every answer submitted against one clue.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyticsQuestionEntity {
    pub answers: Vec<AnalyticsAnswerEntity>,
}

/// Clues of a category in board order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyticsCategoryEntity {
    pub title: String,
    pub questions: Vec<AnalyticsQuestionEntity>,
}

/// Per-round analytics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyticsRoundEntity {
    pub categories: Vec<AnalyticsCategoryEntity>,
    /// Clues that received at least one human answer.
    pub answers: u32,
    /// Clues that received at least one correct human answer.
    pub correct: u32,
    /// Sum of every player's score when the round ended.
    pub score: i64,
}

/// Analytics document persisted once a game reaches post-game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameAnalyticsEntity {
    pub id: Uuid,
    /// Unix timestamp (seconds) at which the game ended.
    pub created_at: i64,
    pub first_round: AnalyticsRoundEntity,
    /// Absent when the game skipped the second round.
    pub second_round: Option<AnalyticsRoundEntity>,
}

/// Aggregate totals over every stored game.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AnalyticsSummaryEntity {
    pub games: u64,
    pub first_round_answers: u64,
    pub first_round_correct: u64,
    pub second_round_answers: u64,
    pub second_round_correct: u64,
}
