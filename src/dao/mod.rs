/// Question repository and analytics persistence.
pub mod question_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
