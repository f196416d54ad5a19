use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to sample round {round} categories")]
    SampleCategories {
        round: u8,
        #[source]
        source: MongoError,
    },
    #[error("failed to sample a final question")]
    SampleFinal {
        #[source]
        source: MongoError,
    },
    #[error("failed to load alternatives")]
    LoadAlternatives {
        #[source]
        source: MongoError,
    },
    #[error("failed to save alternative for `{answer}`")]
    SaveAlternative {
        answer: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save incorrect answer")]
    SaveIncorrect {
        #[source]
        source: MongoError,
    },
    #[error("failed to save analytics for game `{id}`")]
    SaveAnalytics {
        id: uuid::Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to aggregate analytics")]
    AggregateAnalytics {
        #[source]
        source: MongoError,
    },
}
