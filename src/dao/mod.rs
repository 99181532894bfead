/// Database model definitions.
pub mod models;
/// Round persistence and retrieval operations.
pub mod round_store;
/// Storage abstraction layer for database operations.
pub mod storage;
