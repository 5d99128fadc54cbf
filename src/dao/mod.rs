/// Match and attempt persistence.
pub mod match_store;
/// Database model definitions.
pub mod models;
/// Remote scoring authority client.
pub mod scoring;
/// Storage abstraction layer for database operations.
pub mod storage;
