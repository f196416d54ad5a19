use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{DateTime, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoAlternativeDocument, MongoAnalyticsDocument, MongoAnalyticsTotals,
        MongoCategoryDocument, MongoFinalDocument, MongoIncorrectDocument,
    },
};
use crate::dao::{
    models::{
        AnalyticsSummaryEntity, CategoryEntity, FinalQuestionEntity, GameAnalyticsEntity,
        QuestionEntity,
    },
    question_store::{QuestionStore, memory::QUESTIONS_PER_CATEGORY},
    storage::{StorageError, StorageResult},
};

const CATEGORY_COLLECTION_NAME: &str = "categories";
const FINAL_COLLECTION_NAME: &str = "final_questions";
const ALTERNATIVE_COLLECTION_NAME: &str = "alternatives";
const INCORRECT_COLLECTION_NAME: &str = "incorrect_answers";
const ANALYTICS_COLLECTION_NAME: &str = "analytics";

/// MongoDB-backed trivia repository and analytics sink.
#[derive(Clone)]
pub struct MongoQuestionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoQuestionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let categories = database.collection::<MongoCategoryDocument>(CATEGORY_COLLECTION_NAME);
        let round_index = mongodb::IndexModel::builder()
            .keys(doc! { "round": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("category_round_idx".to_owned()))
                    .build(),
            )
            .build();
        categories
            .create_index(round_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: CATEGORY_COLLECTION_NAME,
                index: "round",
                source,
            })?;

        let alternatives =
            database.collection::<MongoAlternativeDocument>(ALTERNATIVE_COLLECTION_NAME);
        let pair_index = mongodb::IndexModel::builder()
            .keys(doc! { "answer": 1, "alternative": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("alternative_pair_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        alternatives
            .create_index(pair_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ALTERNATIVE_COLLECTION_NAME,
                index: "answer,alternative",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        let guard = self.inner.state.read().await;
        guard.database.collection::<T>(name)
    }

    async fn sample_categories(&self, round: u8, count: usize) -> MongoResult<Vec<CategoryEntity>> {
        let collection = self
            .collection::<MongoCategoryDocument>(CATEGORY_COLLECTION_NAME)
            .await;
        let size = i64::try_from(count).unwrap_or(i64::MAX);
        let pipeline = vec![
            doc! { "$match": {
                "round": i32::from(round),
                "questions": { "$size": QUESTIONS_PER_CATEGORY as i32 },
            } },
            doc! { "$sample": { "size": size } },
        ];

        let documents: Vec<MongoCategoryDocument> = collection
            .aggregate(pipeline)
            .with_type::<MongoCategoryDocument>()
            .await
            .map_err(|source| MongoDaoError::SampleCategories { round, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::SampleCategories { round, source })?;

        let mut categories: Vec<CategoryEntity> =
            documents.into_iter().map(CategoryEntity::from).collect();
        let answers: Vec<String> = categories
            .iter()
            .flat_map(|category| category.questions.iter().map(|q| q.answer.clone()))
            .collect();
        let registered = self.load_alternatives(answers).await?;
        for question in categories
            .iter_mut()
            .flat_map(|category| category.questions.iter_mut())
        {
            merge_alternatives(question, &registered);
        }
        Ok(categories)
    }

    async fn sample_final(&self) -> MongoResult<Option<FinalQuestionEntity>> {
        let collection = self
            .collection::<MongoFinalDocument>(FINAL_COLLECTION_NAME)
            .await;
        let pipeline = vec![doc! { "$sample": { "size": 1 } }];

        let documents: Vec<MongoFinalDocument> = collection
            .aggregate(pipeline)
            .with_type::<MongoFinalDocument>()
            .await
            .map_err(|source| MongoDaoError::SampleFinal { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::SampleFinal { source })?;

        let Some(document) = documents.into_iter().next() else {
            return Ok(None);
        };
        let mut entity = FinalQuestionEntity::from(document);
        let registered = self
            .load_alternatives(vec![entity.question.answer.clone()])
            .await?;
        merge_alternatives(&mut entity.question, &registered);
        Ok(Some(entity))
    }

    async fn load_alternatives(
        &self,
        answers: Vec<String>,
    ) -> MongoResult<HashMap<String, BTreeSet<String>>> {
        let collection = self
            .collection::<MongoAlternativeDocument>(ALTERNATIVE_COLLECTION_NAME)
            .await;
        let documents: Vec<MongoAlternativeDocument> = collection
            .find(doc! { "answer": { "$in": answers } })
            .await
            .map_err(|source| MongoDaoError::LoadAlternatives { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadAlternatives { source })?;

        let mut registered: HashMap<String, BTreeSet<String>> = HashMap::new();
        for document in documents {
            registered
                .entry(document.answer)
                .or_default()
                .insert(document.alternative);
        }
        Ok(registered)
    }

    async fn save_alternative(&self, answer: String, alternative: String) -> MongoResult<()> {
        let collection = self
            .collection::<MongoAlternativeDocument>(ALTERNATIVE_COLLECTION_NAME)
            .await;
        let document = MongoAlternativeDocument {
            answer: answer.clone(),
            alternative: alternative.clone(),
        };
        collection
            .replace_one(
                doc! { "answer": &answer, "alternative": &alternative },
                &document,
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveAlternative { answer, source })?;
        Ok(())
    }

    async fn save_incorrect(&self, clue: String, incorrect: String) -> MongoResult<()> {
        let collection = self
            .collection::<MongoIncorrectDocument>(INCORRECT_COLLECTION_NAME)
            .await;
        let document = MongoIncorrectDocument {
            clue,
            incorrect,
            created_at: DateTime::now(),
        };
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveIncorrect { source })?;
        Ok(())
    }

    async fn save_analytics(&self, analytics: GameAnalyticsEntity) -> MongoResult<()> {
        let id = analytics.id;
        let document = MongoAnalyticsDocument::from(analytics);
        let collection = self
            .collection::<MongoAnalyticsDocument>(ANALYTICS_COLLECTION_NAME)
            .await;
        collection
            .replace_one(doc! { "_id": &document.id }, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveAnalytics { id, source })?;
        Ok(())
    }

    async fn aggregate_analytics(&self) -> MongoResult<AnalyticsSummaryEntity> {
        let collection = self
            .collection::<MongoAnalyticsDocument>(ANALYTICS_COLLECTION_NAME)
            .await;
        let pipeline = vec![doc! { "$group": {
            "_id": null,
            "games": { "$sum": 1 },
            "first_round_answers": { "$sum": "$first_round.answers" },
            "first_round_correct": { "$sum": "$first_round.correct" },
            "second_round_answers": { "$sum": { "$ifNull": ["$second_round.answers", 0] } },
            "second_round_correct": { "$sum": { "$ifNull": ["$second_round.correct", 0] } },
        } }];

        let totals: Vec<MongoAnalyticsTotals> = collection
            .aggregate(pipeline)
            .with_type::<MongoAnalyticsTotals>()
            .await
            .map_err(|source| MongoDaoError::AggregateAnalytics { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::AggregateAnalytics { source })?;

        Ok(totals
            .into_iter()
            .next()
            .map(AnalyticsSummaryEntity::from)
            .unwrap_or_default())
    }
}

fn merge_alternatives(question: &mut QuestionEntity, registered: &HashMap<String, BTreeSet<String>>) {
    if let Some(extra) = registered.get(&question.answer) {
        for alternative in extra {
            if !question.alternatives.contains(alternative) {
                question.alternatives.push(alternative.clone());
            }
        }
    }
}

impl QuestionStore for MongoQuestionStore {
    fn random_categories(
        &self,
        round: u8,
        count: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<CategoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let categories = store.sample_categories(round, count).await?;
            if categories.len() < count {
                return Err(StorageError::InsufficientQuestions {
                    round,
                    wanted: count,
                    found: categories.len(),
                });
            }
            Ok(categories)
        })
    }

    fn random_final(&self) -> BoxFuture<'static, StorageResult<FinalQuestionEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .sample_final()
                .await?
                .ok_or(StorageError::InsufficientQuestions {
                    round: 3,
                    wanted: 1,
                    found: 0,
                })
        })
    }

    fn add_alternative(
        &self,
        answer: String,
        alternative: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_alternative(answer, alternative)
                .await
                .map_err(Into::into)
        })
    }

    fn add_incorrect(
        &self,
        clue: String,
        incorrect: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_incorrect(clue, incorrect).await.map_err(Into::into) })
    }

    fn save_analytics(
        &self,
        analytics: GameAnalyticsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_analytics(analytics).await.map_err(Into::into) })
    }

    fn analytics_summary(&self) -> BoxFuture<'static, StorageResult<AnalyticsSummaryEntity>> {
        let store = self.clone();
        Box::pin(async move { store.aggregate_analytics().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
