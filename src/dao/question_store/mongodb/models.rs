use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::dao::models::{
    AnalyticsRoundEntity, AnalyticsSummaryEntity, CategoryEntity, FinalQuestionEntity,
    GameAnalyticsEntity, QuestionEntity,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCategoryDocument {
    pub round: u8,
    pub title: String,
    pub questions: Vec<QuestionEntity>,
}

impl From<MongoCategoryDocument> for CategoryEntity {
    fn from(value: MongoCategoryDocument) -> Self {
        Self {
            title: value.title,
            questions: value.questions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoFinalDocument {
    pub category: String,
    #[serde(flatten)]
    pub question: QuestionEntity,
}

impl From<MongoFinalDocument> for FinalQuestionEntity {
    fn from(value: MongoFinalDocument) -> Self {
        Self {
            category: value.category,
            question: value.question,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAlternativeDocument {
    pub answer: String,
    pub alternative: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoIncorrectDocument {
    pub clue: String,
    pub incorrect: String,
    pub created_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnalyticsDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub created_at: DateTime,
    pub first_round: AnalyticsRoundEntity,
    pub second_round: Option<AnalyticsRoundEntity>,
}

impl From<GameAnalyticsEntity> for MongoAnalyticsDocument {
    fn from(value: GameAnalyticsEntity) -> Self {
        Self {
            id: value.id.to_string(),
            created_at: DateTime::from_millis(value.created_at.saturating_mul(1000)),
            first_round: value.first_round,
            second_round: value.second_round,
        }
    }
}

/// Row produced by the analytics `$group` stage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MongoAnalyticsTotals {
    #[serde(default)]
    pub games: i64,
    #[serde(default)]
    pub first_round_answers: i64,
    #[serde(default)]
    pub first_round_correct: i64,
    #[serde(default)]
    pub second_round_answers: i64,
    #[serde(default)]
    pub second_round_correct: i64,
}

impl From<MongoAnalyticsTotals> for AnalyticsSummaryEntity {
    fn from(value: MongoAnalyticsTotals) -> Self {
        let count = |raw: i64| u64::try_from(raw).unwrap_or_default();
        Self {
            games: count(value.games),
            first_round_answers: count(value.first_round_answers),
            first_round_correct: count(value.first_round_correct),
            second_round_answers: count(value.second_round_answers),
            second_round_correct: count(value.second_round_correct),
        }
    }
}
