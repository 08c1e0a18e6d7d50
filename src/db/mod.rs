//! Graph store: schema management and the SQLite-backed store adapter.

pub mod schema;
pub mod store;

pub use schema::SchemaValidation;
pub use store::{escape_literal, BatchOutcome, GraphStore, StoreStats};
