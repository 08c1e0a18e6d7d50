//! Per-language parsers producing the uniform entity/relationship IR.
//!
//! One parser per language tag. Parsers read and hash the file themselves,
//! emit a File entity plus language-specific entities and edges, and encode
//! cross-file references as `unresolved:` placeholders. They never touch the
//! store and never consult the symbol registry.

pub mod css;
pub mod html;
pub mod parser;
pub mod python;
pub mod typescript;

use std::path::Path;
use std::time::{Instant, UNIX_EPOCH};

use serde_json::Map;

use crate::error::Result;
use crate::indexer::hashing::hash_bytes;
use crate::types::{entity_id, Entity, EntityKind, FileKind, ParseResult};

pub use parser::CstParser;

/// Parser configuration shared across languages.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub include_docstrings: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            include_docstrings: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ParserSet
// ---------------------------------------------------------------------------

/// Dispatch table from language tag to parser.
#[derive(Debug, Default)]
pub struct ParserSet {
    options: ParserOptions,
}

impl ParserSet {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    /// Whether a parser exists for this language tag.
    pub fn supports(&self, kind: FileKind) -> bool {
        !matches!(kind, FileKind::Dockerfile)
    }

    /// Parse one file. Returns `None` for language tags without a parser.
    ///
    /// Never fails outright: I/O errors come back as an error-only
    /// `ParseResult`, syntax errors as a File-entity-only result with the
    /// error recorded.
    pub fn parse_file(&self, path: &Path, kind: FileKind) -> Option<ParseResult> {
        let start = Instant::now();
        let mut result = match kind {
            FileKind::Python => python::parse(path, &self.options),
            FileKind::TypeScript | FileKind::Angular | FileKind::JavaScript => {
                typescript::parse(path, kind, &self.options)
            }
            FileKind::Html => html::parse(path),
            FileKind::Css => css::parse(path),
            FileKind::Dockerfile => return None,
        };
        result.parse_time = start.elapsed();
        Some(result)
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Read a source file, returning its lossy UTF-8 text and the content hash
/// of the raw bytes (the same bytes the hash ledger tracks).
pub(crate) fn read_source(path: &Path) -> Result<(String, String)> {
    let bytes = std::fs::read(path)?;
    let hash = hash_bytes(&bytes);
    Ok((String::from_utf8_lossy(&bytes).into_owned(), hash))
}

/// Build the File entity every parser emits first.
pub(crate) fn file_entity(path: &Path, kind: FileKind, source: &str, hash: &str) -> Entity {
    let file_path = path.to_string_lossy().into_owned();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.clone());
    let line_count = source.lines().count().max(1) as u32;

    let modified_time = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut metadata = Map::new();
    metadata.insert(
        "extension".into(),
        path.extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default()
            .into(),
    );
    metadata.insert("size".into(), (source.len() as u64).into());
    metadata.insert("modified_time".into(), modified_time.into());
    metadata.insert("hash".into(), hash.into());
    metadata.insert("lines_of_code".into(), line_count.into());
    metadata.insert("language".into(), kind.as_str().into());

    Entity {
        id: entity_id(&file_path, EntityKind::File, &name, 1, Some(line_count), None),
        name,
        kind: EntityKind::File,
        file_path,
        line_start: 1,
        line_end: line_count,
        metadata,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
