//! Error types for CodeAtlas.

use thiserror::Error;

/// Unified error type for all CodeAtlas operations.
#[derive(Debug, Error)]
pub enum CodeAtlasError {
    /// Filesystem failures while walking or reading source files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Tree-sitter setup or parse failures.
    #[error("parse error: {0}")]
    Parse(String),

    /// Underlying SQLite failures. Connection failures are fatal; per-row
    /// insert failures are downgraded to soft errors by the store adapter.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Schema creation or validation failures.
    #[error("schema error: {0}")]
    Schema(String),

    /// Invalid or unreadable configuration. Fatal on startup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CodeAtlasError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
