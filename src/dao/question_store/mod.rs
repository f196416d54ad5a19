pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::models::{
    AnalyticsSummaryEntity, CategoryEntity, FinalQuestionEntity, GameAnalyticsEntity,
};
use crate::dao::storage::StorageResult;

/// Abstraction over the trivia repository and the analytics sink.
pub trait QuestionStore: Send + Sync {
    /// Draw `count` random categories of five clues for board round 1 or 2.
    fn random_categories(
        &self,
        round: u8,
        count: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<CategoryEntity>>>;
    /// Draw one random final-round clue.
    fn random_final(&self) -> BoxFuture<'static, StorageResult<FinalQuestionEntity>>;
    /// Accept `alternative` for every clue whose official answer is `answer`.
    fn add_alternative(
        &self,
        answer: String,
        alternative: String,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Remember a rejected submission for `clue`.
    fn add_incorrect(&self, clue: String, incorrect: String)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Persist the analytics of a finished game.
    fn save_analytics(&self, analytics: GameAnalyticsEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Aggregate analytics over every stored game.
    fn analytics_summary(&self) -> BoxFuture<'static, StorageResult<AnalyticsSummaryEntity>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
