//! SQLite schema management for the graph store.
//!
//! The logical property graph maps onto two tables: `nodes` with a `type`
//! discriminator and a JSON attribute bag, and `edges` typed the same way.
//! DDL statements are kept as separate constants so each one can be
//! executed (and reported) individually.

use rusqlite::Connection;

use crate::error::{CodeAtlasError, Result};

// ---------------------------------------------------------------------------
// DDL constants
// ---------------------------------------------------------------------------

const CREATE_NODES: &str = "\
CREATE TABLE IF NOT EXISTS nodes (
  id TEXT PRIMARY KEY,
  type TEXT NOT NULL,
  name TEXT NOT NULL,
  file_path TEXT NOT NULL,
  line_start INTEGER NOT NULL,
  line_end INTEGER NOT NULL,
  metadata TEXT
)";

const CREATE_EDGES: &str = "\
CREATE TABLE IF NOT EXISTS edges (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  source_id TEXT NOT NULL,
  target_id TEXT NOT NULL,
  type TEXT NOT NULL,
  properties TEXT
)";

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_nodes_file ON nodes(file_path)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(type)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(name)",
    "CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id)",
    "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id)",
    "CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(type)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_unique ON edges(source_id, target_id, type)",
];

const EXPECTED_TABLES: &[&str] = &["nodes", "edges"];

const EXPECTED_INDEXES: &[&str] = &[
    "idx_nodes_file",
    "idx_nodes_type",
    "idx_nodes_name",
    "idx_edges_source",
    "idx_edges_target",
    "idx_edges_type",
    "idx_edges_unique",
];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Outcome of [`validate_schema`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaValidation {
    pub valid: bool,
    pub missing_tables: Vec<String>,
    pub missing_indexes: Vec<String>,
}

/// Open (or create) the database at `db_path` with pragmas applied.
/// A connection failure here is fatal and propagates.
pub fn open_database(db_path: &str, query_timeout_secs: u64) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    apply_pragmas(&conn, query_timeout_secs)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, query_timeout_secs: u64) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Endpoint existence is the extraction pipeline's invariant, enforced
    // before anything reaches the store; FK checks would only slow writes.
    conn.pragma_update(None, "foreign_keys", "OFF")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(query_timeout_secs))?;
    Ok(())
}

/// Apply the full schema. Idempotent.
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_NODES)?;
    conn.execute_batch(CREATE_EDGES)?;
    for ddl in CREATE_INDEXES {
        conn.execute_batch(ddl)?;
    }
    tracing::info!("graph schema created");
    Ok(())
}

/// Drop every schema object. Destructive; used by `reset`.
pub fn drop_schema(conn: &Connection) -> Result<()> {
    tracing::warn!("dropping graph schema");
    conn.execute_batch("DROP TABLE IF EXISTS edges")?;
    conn.execute_batch("DROP TABLE IF EXISTS nodes")?;
    Ok(())
}

/// Check that all expected tables and indexes exist.
pub fn validate_schema(conn: &Connection) -> Result<SchemaValidation> {
    let mut validation = SchemaValidation {
        valid: true,
        ..Default::default()
    };

    for table in EXPECTED_TABLES {
        if !object_exists(conn, "table", table)? {
            validation.missing_tables.push(table.to_string());
        }
    }
    for index in EXPECTED_INDEXES {
        if !object_exists(conn, "index", index)? {
            validation.missing_indexes.push(index.to_string());
        }
    }
    validation.valid =
        validation.missing_tables.is_empty() && validation.missing_indexes.is_empty();
    Ok(validation)
}

/// Validate and error out when the schema is incomplete; used by commands
/// that require an initialized store.
pub fn require_schema(conn: &Connection) -> Result<()> {
    let validation = validate_schema(conn)?;
    if !validation.valid {
        return Err(CodeAtlasError::Schema(format!(
            "schema incomplete: missing tables {:?}, missing indexes {:?} (run init)",
            validation.missing_tables, validation.missing_indexes
        )));
    }
    Ok(())
}

fn object_exists(conn: &Connection, obj_type: &str, obj_name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
        rusqlite::params![obj_type, obj_name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
