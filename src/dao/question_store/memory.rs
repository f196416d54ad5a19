//! In-process question repository seeded from a JSON file.
//!
//! Used when no database is configured and as the fixture store in tests.

use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use futures::future::{self, BoxFuture};
use rand::seq::IndexedRandom;
use serde::Deserialize;

use crate::dao::{
    models::{
        AnalyticsSummaryEntity, CategoryEntity, FinalQuestionEntity, GameAnalyticsEntity,
        QuestionEntity,
    },
    question_store::QuestionStore,
    storage::{StorageError, StorageResult},
};

/// Number of clues every category column must hold.
pub const QUESTIONS_PER_CATEGORY: usize = 5;

/// JSON layout of the seed file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSeed {
    #[serde(default)]
    pub first_round: Vec<CategoryEntity>,
    #[serde(default)]
    pub second_round: Vec<CategoryEntity>,
    #[serde(default)]
    pub finals: Vec<FinalQuestionEntity>,
}

#[derive(Debug, thiserror::Error)]
enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse seed file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Default)]
struct MemoryState {
    seed: QuestionSeed,
    alternatives: HashMap<String, BTreeSet<String>>,
    incorrect: Vec<(String, String)>,
    analytics: Vec<GameAnalyticsEntity>,
}

/// Question store keeping everything in memory.
#[derive(Clone, Default)]
pub struct MemoryQuestionStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryQuestionStore {
    /// Build a store around an already parsed seed.
    pub fn new(seed: QuestionSeed) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryState {
                seed,
                ..MemoryState::default()
            })),
        }
    }

    /// Read and parse a seed file.
    pub fn load(path: &Path) -> StorageResult<Self> {
        let message = format!("loading question seed `{}`", path.display());
        let contents = fs::read_to_string(path)
            .map_err(SeedError::from)
            .map_err(|err| StorageError::unavailable(message.clone(), err))?;
        let seed = serde_json::from_str::<QuestionSeed>(&contents)
            .map_err(SeedError::from)
            .map_err(|err| StorageError::unavailable(message, err))?;
        Ok(Self::new(seed))
    }

    /// Alternatives registered for `answer` so far.
    pub fn alternatives_for(&self, answer: &str) -> Vec<String> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state
            .alternatives
            .get(answer)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rejected submissions recorded so far as `(clue, incorrect)` pairs.
    pub fn incorrect_answers(&self) -> Vec<(String, String)> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state.incorrect.clone()
    }

    /// Analytics documents saved so far.
    pub fn saved_analytics(&self) -> Vec<GameAnalyticsEntity> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state.analytics.clone()
    }

    fn draw_categories(&self, round: u8, count: usize) -> StorageResult<Vec<CategoryEntity>> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let pool = match round {
            1 => &state.seed.first_round,
            _ => &state.seed.second_round,
        };
        let usable: Vec<&CategoryEntity> = pool
            .iter()
            .filter(|category| category.questions.len() == QUESTIONS_PER_CATEGORY)
            .collect();
        if usable.len() < count {
            return Err(StorageError::InsufficientQuestions {
                round,
                wanted: count,
                found: usable.len(),
            });
        }

        let mut rng = rand::rng();
        Ok(usable
            .choose_multiple(&mut rng, count)
            .map(|category| CategoryEntity {
                title: category.title.clone(),
                questions: category
                    .questions
                    .iter()
                    .map(|question| with_alternatives(question, &state.alternatives))
                    .collect(),
            })
            .collect())
    }

    fn draw_final(&self) -> StorageResult<FinalQuestionEntity> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut rng = rand::rng();
        state
            .seed
            .finals
            .choose(&mut rng)
            .map(|entry| FinalQuestionEntity {
                category: entry.category.clone(),
                question: with_alternatives(&entry.question, &state.alternatives),
            })
            .ok_or(StorageError::InsufficientQuestions {
                round: 3,
                wanted: 1,
                found: 0,
            })
    }

    fn summary(&self) -> AnalyticsSummaryEntity {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state
            .analytics
            .iter()
            .fold(AnalyticsSummaryEntity::default(), |mut acc, game| {
                acc.games += 1;
                acc.first_round_answers += u64::from(game.first_round.answers);
                acc.first_round_correct += u64::from(game.first_round.correct);
                if let Some(second) = &game.second_round {
                    acc.second_round_answers += u64::from(second.answers);
                    acc.second_round_correct += u64::from(second.correct);
                }
                acc
            })
    }
}

fn with_alternatives(
    question: &QuestionEntity,
    registered: &HashMap<String, BTreeSet<String>>,
) -> QuestionEntity {
    let mut question = question.clone();
    if let Some(extra) = registered.get(&question.answer) {
        for alternative in extra {
            if !question.alternatives.contains(alternative) {
                question.alternatives.push(alternative.clone());
            }
        }
    }
    question
}

impl QuestionStore for MemoryQuestionStore {
    fn random_categories(
        &self,
        round: u8,
        count: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<CategoryEntity>>> {
        Box::pin(future::ready(self.draw_categories(round, count)))
    }

    fn random_final(&self) -> BoxFuture<'static, StorageResult<FinalQuestionEntity>> {
        Box::pin(future::ready(self.draw_final()))
    }

    fn add_alternative(
        &self,
        answer: String,
        alternative: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state
            .alternatives
            .entry(answer)
            .or_default()
            .insert(alternative);
        Box::pin(future::ready(Ok(())))
    }

    fn add_incorrect(
        &self,
        clue: String,
        incorrect: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.incorrect.push((clue, incorrect));
        Box::pin(future::ready(Ok(())))
    }

    fn save_analytics(
        &self,
        analytics: GameAnalyticsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.analytics.push(analytics);
        Box::pin(future::ready(Ok(())))
    }

    fn analytics_summary(&self) -> BoxFuture<'static, StorageResult<AnalyticsSummaryEntity>> {
        Box::pin(future::ready(Ok(self.summary())))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn draws_requested_number_of_categories() {
        let store = MemoryQuestionStore::new(fixtures::seed());
        let categories = store.random_categories(1, 6).await.unwrap();
        assert_eq!(categories.len(), 6);
        assert!(categories.iter().all(|c| c.title.starts_with("first")));
    }

    #[tokio::test]
    async fn refuses_when_pool_is_too_small() {
        let store = MemoryQuestionStore::new(fixtures::seed());
        let err = store.random_categories(2, 7).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::InsufficientQuestions {
                round: 2,
                wanted: 7,
                found: 6
            }
        ));
    }

    #[tokio::test]
    async fn alternatives_are_merged_into_later_draws() {
        let store = MemoryQuestionStore::new(fixtures::seed());
        store
            .add_alternative("Mark Twain".into(), "Samuel Clemens".into())
            .await
            .unwrap();

        let final_question = store.random_final().await.unwrap();
        assert_eq!(
            final_question.question.alternatives,
            vec!["Samuel Clemens".to_string()]
        );
        assert_eq!(store.alternatives_for("Mark Twain").len(), 1);
    }

    #[tokio::test]
    async fn summary_adds_up_saved_games() {
        let store = MemoryQuestionStore::new(QuestionSeed::default());
        let game = GameAnalyticsEntity {
            id: uuid::Uuid::new_v4(),
            created_at: 0,
            first_round: crate::dao::models::AnalyticsRoundEntity {
                answers: 10,
                correct: 7,
                ..Default::default()
            },
            second_round: None,
        };
        store.save_analytics(game.clone()).await.unwrap();
        store.save_analytics(game).await.unwrap();

        let summary = store.analytics_summary().await.unwrap();
        assert_eq!(summary.games, 2);
        assert_eq!(summary.first_round_answers, 20);
        assert_eq!(summary.first_round_correct, 14);
        assert_eq!(summary.second_round_answers, 0);
    }
}
