//! Store adapter: translates entity/edge batches into SQLite mutations.
//!
//! The only module that speaks SQL. Writes are batched in transactions with
//! a per-row fallback so one bad row cannot abort an update; duplicate
//! primary keys are soft errors (first writer wins). Each entity kind and
//! relationship type has a fixed attribute schema — unknown attributes are
//! dropped with a warning and missing ones filled with defaults before
//! anything is persisted.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use crate::db::schema;
use crate::error::Result;
use crate::resolution::SymbolSource;
use crate::types::{Entity, EntityKind, RelKind, Relationship};

// ---------------------------------------------------------------------------
// SQL constants
// ---------------------------------------------------------------------------

const INSERT_NODE_SQL: &str = "\
INSERT OR IGNORE INTO nodes (id, type, name, file_path, line_start, line_end, metadata)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const INSERT_EDGE_SQL: &str = "\
INSERT OR IGNORE INTO edges (source_id, target_id, type, properties)
VALUES (?1, ?2, ?3, ?4)";

const DELETE_EDGES_BY_FILE_SQL: &str = "\
DELETE FROM edges WHERE source_id IN (SELECT id FROM nodes WHERE file_path = ?1)
   OR target_id IN (SELECT id FROM nodes WHERE file_path = ?1)";

const DELETE_NODES_BY_FILE_SQL: &str = "DELETE FROM nodes WHERE file_path = ?1";

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a batched write.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    /// Rows rejected because the primary key already existed.
    pub duplicates: usize,
    /// Rows that failed even through the per-row fallback.
    pub failed: usize,
    pub warnings: Vec<String>,
}

impl BatchOutcome {
    fn merge(&mut self, other: BatchOutcome) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
        self.warnings.extend(other.warnings);
    }
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub entities: usize,
    pub relationships: usize,
    pub files: usize,
}

// ---------------------------------------------------------------------------
// GraphStore
// ---------------------------------------------------------------------------

/// Typed CRUD wrapper around the graph database.
///
/// Every statement goes through [`Connection::prepare_cached`], so repeat
/// calls reuse compiled statements from the connection's LRU cache.
pub struct GraphStore {
    pub conn: Connection,
    batch_size: usize,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl GraphStore {
    /// Open (or create) the store at `db_path`. Connection failures are
    /// fatal and propagate to the caller.
    pub fn open(db_path: &Path, query_timeout_secs: u64, batch_size: usize) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = schema::open_database(&db_path.to_string_lossy(), query_timeout_secs)?;
        Ok(Self {
            conn,
            batch_size: batch_size.max(1),
        })
    }

    /// In-memory store with schema applied, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_schema(&conn)?;
        Ok(Self {
            conn,
            batch_size: 1000,
        })
    }

    // -- schema -------------------------------------------------------------

    pub fn create_schema(&self) -> Result<()> {
        schema::create_schema(&self.conn)
    }

    pub fn drop_schema(&self) -> Result<()> {
        schema::drop_schema(&self.conn)
    }

    pub fn validate_schema(&self) -> Result<schema::SchemaValidation> {
        schema::validate_schema(&self.conn)
    }

    pub fn require_schema(&self) -> Result<()> {
        schema::require_schema(&self.conn)
    }

    // -- entity writes ------------------------------------------------------

    /// Insert entities in configured-size batches. Duplicate ids are
    /// rejected, not overwritten, and reported as soft errors.
    pub fn upsert_entities(&self, entities: &[Entity]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for chunk in entities.chunks(self.batch_size) {
            match self.insert_entity_chunk(chunk) {
                Ok(chunk_outcome) => outcome.merge(chunk_outcome),
                Err(e) => {
                    tracing::warn!("entity batch failed ({e}); retrying per row");
                    outcome.merge(self.insert_entities_row_by_row(chunk));
                }
            }
        }
        Ok(outcome)
    }

    fn insert_entity_chunk(&self, chunk: &[Entity]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT_NODE_SQL)?;
            for entity in chunk {
                let (metadata, warnings) = normalize_entity_metadata(entity);
                outcome.warnings.extend(warnings);
                let changed = stmt.execute(params![
                    entity.id,
                    entity.kind.as_str(),
                    entity.name,
                    entity.file_path,
                    entity.line_start,
                    entity.line_end,
                    Value::Object(metadata).to_string(),
                ])?;
                if changed == 0 {
                    outcome.duplicates += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn insert_entities_row_by_row(&self, chunk: &[Entity]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for entity in chunk {
            let (metadata, warnings) = normalize_entity_metadata(entity);
            outcome.warnings.extend(warnings);
            let result = self.conn.prepare_cached(INSERT_NODE_SQL).and_then(|mut s| {
                s.execute(params![
                    entity.id,
                    entity.kind.as_str(),
                    entity.name,
                    entity.file_path,
                    entity.line_start,
                    entity.line_end,
                    Value::Object(metadata).to_string(),
                ])
            });
            match result {
                Ok(0) => outcome.duplicates += 1,
                Ok(_) => outcome.inserted += 1,
                Err(e) => {
                    outcome.failed += 1;
                    outcome
                        .warnings
                        .push(format!("entity {} failed: {e}", entity.id));
                }
            }
        }
        outcome
    }

    // -- relationship writes ------------------------------------------------

    /// Insert relationships in batches. Endpoint existence is the caller's
    /// responsibility (the resolver guarantees it).
    pub fn insert_relationships(&self, relationships: &[Relationship]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for chunk in relationships.chunks(self.batch_size) {
            match self.insert_edge_chunk(chunk) {
                Ok(chunk_outcome) => outcome.merge(chunk_outcome),
                Err(e) => {
                    tracing::warn!("edge batch failed ({e}); retrying per row");
                    outcome.merge(self.insert_edges_row_by_row(chunk));
                }
            }
        }
        Ok(outcome)
    }

    fn insert_edge_chunk(&self, chunk: &[Relationship]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT_EDGE_SQL)?;
            for relationship in chunk {
                let (properties, warnings) = normalize_edge_attrs(relationship);
                outcome.warnings.extend(warnings);
                let changed = stmt.execute(params![
                    relationship.from_id,
                    relationship.to_id,
                    relationship.kind.name(),
                    Value::Object(properties).to_string(),
                ])?;
                if changed == 0 {
                    outcome.duplicates += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn insert_edges_row_by_row(&self, chunk: &[Relationship]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for relationship in chunk {
            let (properties, warnings) = normalize_edge_attrs(relationship);
            outcome.warnings.extend(warnings);
            let result = self.conn.prepare_cached(INSERT_EDGE_SQL).and_then(|mut s| {
                s.execute(params![
                    relationship.from_id,
                    relationship.to_id,
                    relationship.kind.name(),
                    Value::Object(properties).to_string(),
                ])
            });
            match result {
                Ok(0) => outcome.duplicates += 1,
                Ok(_) => outcome.inserted += 1,
                Err(e) => {
                    outcome.failed += 1;
                    outcome.warnings.push(format!(
                        "edge {} -> {} failed: {e}",
                        relationship.from_id, relationship.to_id
                    ));
                }
            }
        }
        outcome
    }

    // -- deletes ------------------------------------------------------------

    /// Remove all graph data, keeping the schema. Used by full rebuilds.
    pub fn delete_all(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM edges", [])?;
        tx.execute("DELETE FROM nodes", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Atomically remove every entity whose `file_path` matches, along with
    /// all incident edges (either direction).
    pub fn delete_entities_for_file(&self, file_path: &str) -> Result<(usize, usize)> {
        let tx = self.conn.unchecked_transaction()?;
        let edges = tx.execute(DELETE_EDGES_BY_FILE_SQL, params![file_path])?;
        let entities = tx.execute(DELETE_NODES_BY_FILE_SQL, params![file_path])?;
        tx.commit()?;
        tracing::debug!("removed {entities} entities, {edges} edges for {file_path}");
        Ok((entities, edges))
    }

    // -- reads --------------------------------------------------------------

    /// The persisted hash ledger: `(file_path, content_hash)` from every
    /// File entity's `hash` attribute.
    pub fn file_hashes(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT file_path, metadata FROM nodes WHERE type = 'File'")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut hashes = Vec::new();
        for row in rows {
            let (path, metadata) = row?;
            let hash = metadata
                .as_deref()
                .and_then(|m| serde_json::from_str::<Value>(m).ok())
                .and_then(|v| v.get("hash").and_then(Value::as_str).map(str::to_string));
            if let Some(hash) = hash {
                hashes.push((path, hash));
            }
        }
        Ok(hashes)
    }

    /// All entities stored for one file path.
    pub fn entities_for_file(&self, file_path: &str) -> Result<Vec<Entity>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, type, name, file_path, line_start, line_end, metadata
             FROM nodes WHERE file_path = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![file_path], row_to_entity)?;
        let mut entities = Vec::new();
        for row in rows {
            if let Some(entity) = row? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// Opaque read-only passthrough: each row becomes a JSON object keyed
    /// by column name.
    pub fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Value>> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query(params)?;
        let mut output = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::new();
            for (index, name) in column_names.iter().enumerate() {
                let value = match row.get_ref(index)? {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(i) => Value::from(i),
                    rusqlite::types::ValueRef::Real(f) => Value::from(f),
                    rusqlite::types::ValueRef::Text(t) => {
                        Value::from(String::from_utf8_lossy(t).into_owned())
                    }
                    rusqlite::types::ValueRef::Blob(b) => Value::from(hex::encode(b)),
                };
                object.insert(name.clone(), value);
            }
            output.push(Value::Object(object));
        }
        Ok(output)
    }

    /// Liveness probe.
    pub fn health_check(&self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .optional()
            .map(|v| v == Some(1))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let entities: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        let relationships: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        let files: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE type = 'File'",
            [],
            |row| row.get(0),
        )?;
        Ok(StoreStats {
            entities: entities as usize,
            relationships: relationships as usize,
            files: files as usize,
        })
    }
}

impl SymbolSource for GraphStore {
    fn lookup_entities(&self, term: &str) -> Vec<Entity> {
        let result = (|| -> Result<Vec<Entity>> {
            let mut stmt = self.conn.prepare_cached(
                "SELECT id, type, name, file_path, line_start, line_end, metadata
                 FROM nodes WHERE name = ?1 OR file_path = ?1 ORDER BY id LIMIT 64",
            )?;
            let rows = stmt.query_map(params![term], row_to_entity)?;
            let mut entities = Vec::new();
            for row in rows {
                if let Some(entity) = row? {
                    entities.push(entity);
                }
            }
            Ok(entities)
        })();
        match result {
            Ok(entities) => entities,
            Err(e) => {
                tracing::warn!("symbol lookup for {term:?} failed: {e}");
                Vec::new()
            }
        }
    }
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<Entity>> {
    let kind_text: String = row.get(1)?;
    let Some(kind) = EntityKind::from_str_loose(&kind_text) else {
        return Ok(None);
    };
    let metadata: Option<String> = row.get(6)?;
    let metadata = metadata
        .as_deref()
        .and_then(|m| serde_json::from_str::<Value>(m).ok())
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    Ok(Some(Entity {
        id: row.get(0)?,
        name: row.get(2)?,
        kind,
        file_path: row.get(3)?,
        line_start: row.get(4)?,
        line_end: row.get(5)?,
        metadata,
    }))
}

// ---------------------------------------------------------------------------
// Literal escaping
// ---------------------------------------------------------------------------

/// Escape a string for interpolation into a store query literal.
/// Order matters: backslashes first, then quotes and control characters.
pub fn escape_literal(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

// ---------------------------------------------------------------------------
// Attribute normalization
// ---------------------------------------------------------------------------

/// Allowed metadata attributes per entity kind. Anything else is dropped
/// with a warning before the row is written.
fn allowed_entity_attrs(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::File => &[
            "extension",
            "size",
            "modified_time",
            "hash",
            "lines_of_code",
            "language",
            "is_template",
            "template_type",
            "framework",
            "angular_directives",
            "property_bindings",
            "event_bindings",
            "interpolations",
            "custom_components",
            "material_components",
            "selector_count",
            "import_count",
            "nesting_depth",
            "variable_count",
        ],
        EntityKind::Module => &["file_id", "docstring"],
        EntityKind::Class => &[
            "file_id",
            "module_id",
            "docstring",
            "is_abstract",
            "parent_class",
            "extends",
            "method_count",
            "property_count",
            "exported",
        ],
        EntityKind::Function => &[
            "file_id",
            "module_id",
            "class_id",
            "parent_function",
            "docstring",
            "signature",
            "return_type",
            "parameter_count",
            "is_async",
            "is_generator",
            "is_arrow",
            "is_property",
            "is_staticmethod",
            "is_classmethod",
            "complexity",
            "exported",
        ],
        EntityKind::Method
        | EntityKind::Constructor
        | EntityKind::Getter
        | EntityKind::Setter => &[
            "file_id",
            "class_id",
            "signature",
            "return_type",
            "parameter_count",
            "is_async",
            "is_static",
            "accessibility",
            "complexity",
        ],
        EntityKind::Variable => &[
            "file_id",
            "scope_id",
            "type_annotation",
            "is_global",
            "is_constant",
            "exported",
        ],
        EntityKind::Import => &[
            "file_id",
            "module_name",
            "alias",
            "is_from_import",
            "import_type",
            "is_relative",
            "symbols",
        ],
        EntityKind::Export => &["file_id", "export_type", "is_default"],
        EntityKind::Interface => &[
            "file_id",
            "docstring",
            "property_count",
            "method_count",
            "exported",
        ],
        EntityKind::TypeAlias => &["file_id", "type_definition", "exported"],
        EntityKind::Enum => &["file_id", "values", "exported"],
        EntityKind::Decorator => &["file_id", "decorator_name", "arguments"],
        EntityKind::AngularComponent => &[
            "file_id",
            "selector",
            "template_url",
            "style_url",
            "style_urls",
            "standalone",
            "imports",
            "class_name",
            "decorator_name",
            "framework",
        ],
        EntityKind::AngularService => &[
            "file_id",
            "provided_in",
            "class_name",
            "decorator_name",
            "framework",
        ],
        EntityKind::AngularDirective => &[
            "file_id",
            "selector",
            "standalone",
            "class_name",
            "decorator_name",
            "framework",
        ],
        EntityKind::AngularPipe => &[
            "file_id",
            "pipe_name",
            "standalone",
            "class_name",
            "decorator_name",
            "framework",
        ],
        EntityKind::AngularModule => &[
            "file_id",
            "declarations",
            "imports",
            "exports",
            "providers",
            "class_name",
            "decorator_name",
            "framework",
        ],
        EntityKind::AngularInput => &[
            "file_id",
            "input_name",
            "required",
            "decorator_name",
            "framework",
        ],
        EntityKind::AngularOutput => &[
            "file_id",
            "output_name",
            "event_type",
            "decorator_name",
            "framework",
        ],
        EntityKind::ExternalFunction
        | EntityKind::ExternalProperty
        | EntityKind::ExternalModule
        | EntityKind::ExternalExport
        | EntityKind::ExternalSymbol
        | EntityKind::ExternalReference
        | EntityKind::ExternalTemplate
        | EntityKind::ExternalStyle => &[
            "is_external",
            "reference_type",
            "original_reference",
            "object_name",
            "property_path",
            "line_number",
        ],
    }
}

fn normalize_entity_metadata(entity: &Entity) -> (Map<String, Value>, Vec<String>) {
    let allowed = allowed_entity_attrs(entity.kind);
    let mut metadata = Map::new();
    let mut warnings = Vec::new();
    for (key, value) in &entity.metadata {
        if allowed.contains(&key.as_str()) {
            metadata.insert(key.clone(), value.clone());
        } else {
            warnings.push(format!(
                "dropped attribute {key:?} not in {} schema (entity {})",
                entity.kind, entity.name
            ));
        }
    }
    (metadata, warnings)
}

/// Default value for a missing edge attribute.
enum AttrDefault {
    Str(&'static str),
    Int(i64),
}

/// Fixed attribute schema per relationship type. Containment,
/// inheritance, and implementation edges carry no attributes.
fn edge_attr_schema(kind: &RelKind) -> &'static [(&'static str, AttrDefault)] {
    match kind {
        RelKind::Calls => &[
            ("call_type", AttrDefault::Str("function_call")),
            ("line_number", AttrDefault::Int(0)),
        ],
        RelKind::Uses => &[
            ("usage_type", AttrDefault::Str("variable_access")),
            ("line_number", AttrDefault::Int(0)),
        ],
        RelKind::Accesses => &[
            ("property_path", AttrDefault::Str("")),
            ("access_location", AttrDefault::Int(0)),
        ],
        RelKind::Imports => &[("import_type", AttrDefault::Str("named"))],
        RelKind::ImportsStyle => &[
            ("style_path", AttrDefault::Str("")),
            ("line_number", AttrDefault::Int(0)),
        ],
        RelKind::Exports => &[
            ("export_type", AttrDefault::Str("named")),
            ("symbol", AttrDefault::Str("")),
        ],
        RelKind::Decorates => &[("decorator_name", AttrDefault::Str(""))],
        RelKind::UsesTemplate => &[
            ("template_path", AttrDefault::Str("")),
            ("resolved_path", AttrDefault::Str("")),
            ("component_selector", AttrDefault::Str("")),
        ],
        RelKind::UsesStyles => &[
            ("style_path", AttrDefault::Str("")),
            ("resolved_path", AttrDefault::Str("")),
            ("component_selector", AttrDefault::Str("")),
        ],
        RelKind::UsesComponent => &[
            ("component_tag", AttrDefault::Str("")),
            ("usage_type", AttrDefault::Str("template_reference")),
        ],
        RelKind::Contains(..)
        | RelKind::Inherits
        | RelKind::Extends
        | RelKind::Implements => &[],
    }
}

fn normalize_edge_attrs(relationship: &Relationship) -> (Map<String, Value>, Vec<String>) {
    let schema = edge_attr_schema(&relationship.kind);
    let mut properties = Map::new();
    let mut warnings = Vec::new();

    for (key, default) in schema {
        let value = relationship
            .metadata
            .get(*key)
            .cloned()
            .unwrap_or_else(|| match default {
                AttrDefault::Str(s) => Value::from(*s),
                AttrDefault::Int(i) => Value::from(*i),
            });
        properties.insert((*key).to_string(), value);
    }

    for key in relationship.metadata.keys() {
        // component_file_path is resolver plumbing, silently consumed.
        if !schema.iter().any(|(allowed, _)| allowed == key) && key != "component_file_path" {
            warnings.push(format!(
                "dropped attribute {key:?} not in {} schema",
                relationship.kind.name()
            ));
        }
    }
    (properties, warnings)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScopeKind;
    use pretty_assertions::assert_eq;

    fn entity(kind: EntityKind, id: &str, name: &str, file: &str) -> Entity {
        Entity {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            file_path: file.to_string(),
            line_start: 1,
            line_end: 5,
            metadata: Map::new(),
        }
    }

    #[test]
    fn insert_and_count_entities() {
        let store = GraphStore::in_memory().unwrap();
        let entities = vec![
            entity(EntityKind::File, "f1", "a.py", "a.py"),
            entity(EntityKind::Function, "fn1", "run", "a.py"),
        ];
        let outcome = store.upsert_entities(&entities).unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.duplicates, 0);
        assert_eq!(store.stats().unwrap().entities, 2);
        assert_eq!(store.stats().unwrap().files, 1);
    }

    #[test]
    fn duplicate_ids_are_soft_errors_not_overwrites() {
        let store = GraphStore::in_memory().unwrap();
        let first = entity(EntityKind::Function, "dup", "original", "a.py");
        let second = entity(EntityKind::Function, "dup", "imposter", "b.py");

        store.upsert_entities(&[first]).unwrap();
        let outcome = store.upsert_entities(&[second]).unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.duplicates, 1);

        // First writer wins.
        let rows = store
            .query("SELECT name FROM nodes WHERE id = 'dup'", &[])
            .unwrap();
        assert_eq!(rows[0]["name"], Value::from("original"));
    }

    #[test]
    fn edges_insert_with_normalized_attrs() {
        let store = GraphStore::in_memory().unwrap();
        let rel = Relationship::new("a", "b", RelKind::Calls)
            .with_attr("line_number", 7)
            .with_attr("bogus_key", "zap");
        let outcome = store.insert_relationships(&[rel]).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert!(outcome.warnings.iter().any(|w| w.contains("bogus_key")));

        let rows = store
            .query("SELECT properties FROM edges", &[])
            .unwrap();
        let properties: Value =
            serde_json::from_str(rows[0]["properties"].as_str().unwrap()).unwrap();
        assert_eq!(properties["line_number"], Value::from(7));
        assert_eq!(properties["call_type"], Value::from("function_call"));
        assert!(properties.get("bogus_key").is_none());
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let store = GraphStore::in_memory().unwrap();
        let rel = Relationship::new("a", "b", RelKind::Calls);
        store.insert_relationships(&[rel.clone()]).unwrap();
        let outcome = store.insert_relationships(&[rel]).unwrap();
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(store.stats().unwrap().relationships, 1);
    }

    #[test]
    fn entity_metadata_filtered_by_kind_schema() {
        let store = GraphStore::in_memory().unwrap();
        let mut e = entity(EntityKind::Variable, "v1", "x", "a.py");
        e.set_attr("type_annotation", "int");
        e.set_attr("made_up_field", "nope");
        let outcome = store.upsert_entities(&[e]).unwrap();
        assert!(outcome.warnings.iter().any(|w| w.contains("made_up_field")));

        let rows = store
            .query("SELECT metadata FROM nodes WHERE id = 'v1'", &[])
            .unwrap();
        let metadata: Value =
            serde_json::from_str(rows[0]["metadata"].as_str().unwrap()).unwrap();
        assert_eq!(metadata["type_annotation"], Value::from("int"));
        assert!(metadata.get("made_up_field").is_none());
    }

    #[test]
    fn delete_entities_for_file_removes_incident_edges() {
        let store = GraphStore::in_memory().unwrap();
        store
            .upsert_entities(&[
                entity(EntityKind::File, "fa", "a.py", "a.py"),
                entity(EntityKind::Function, "fn-a", "f", "a.py"),
                entity(EntityKind::File, "fb", "b.py", "b.py"),
                entity(EntityKind::Function, "fn-b", "g", "b.py"),
            ])
            .unwrap();
        store
            .insert_relationships(&[
                Relationship::new(
                    "fa",
                    "fn-a",
                    RelKind::Contains(ScopeKind::File, EntityKind::Function),
                ),
                Relationship::new("fn-b", "fn-a", RelKind::Calls),
                Relationship::new(
                    "fb",
                    "fn-b",
                    RelKind::Contains(ScopeKind::File, EntityKind::Function),
                ),
            ])
            .unwrap();

        let (entities, edges) = store.delete_entities_for_file("a.py").unwrap();
        assert_eq!(entities, 2);
        assert_eq!(edges, 2, "inbound call edge must go too");

        let stats = store.stats().unwrap();
        assert_eq!(stats.entities, 2);
        assert_eq!(stats.relationships, 1);
    }

    #[test]
    fn file_hashes_come_from_file_metadata() {
        let store = GraphStore::in_memory().unwrap();
        let mut file = entity(EntityKind::File, "f1", "a.py", "a.py");
        file.set_attr("hash", "abc123");
        store.upsert_entities(&[file]).unwrap();
        store
            .upsert_entities(&[entity(EntityKind::Function, "fn1", "f", "a.py")])
            .unwrap();

        assert_eq!(
            store.file_hashes().unwrap(),
            vec![("a.py".to_string(), "abc123".to_string())]
        );
    }

    #[test]
    fn lookup_entities_matches_name_and_path() {
        let store = GraphStore::in_memory().unwrap();
        let mut file = entity(EntityKind::File, "f1", "x.html", "/p/src/x.html");
        file.set_attr("language", "html");
        store.upsert_entities(&[file]).unwrap();

        assert_eq!(store.lookup_entities("x.html").len(), 1);
        assert_eq!(store.lookup_entities("/p/src/x.html").len(), 1);
        assert!(store.lookup_entities("y.html").is_empty());
    }

    #[test]
    fn query_passthrough_returns_json_rows() {
        let store = GraphStore::in_memory().unwrap();
        store
            .upsert_entities(&[entity(EntityKind::Class, "c1", "Widget", "w.ts")])
            .unwrap();
        let rows = store
            .query(
                "SELECT id, name, line_start FROM nodes WHERE type = 'Class'",
                &[],
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], Value::from("Widget"));
        assert_eq!(rows[0]["line_start"], Value::from(1));
    }

    #[test]
    fn health_check_and_batching() {
        let store = GraphStore::in_memory().unwrap();
        assert!(store.health_check());

        // More rows than one batch.
        let entities: Vec<Entity> = (0..2500)
            .map(|i| entity(EntityKind::Function, &format!("id{i}"), "f", "a.py"))
            .collect();
        let outcome = store.upsert_entities(&entities).unwrap();
        assert_eq!(outcome.inserted, 2500);
    }

    #[test]
    fn escape_literal_order() {
        assert_eq!(escape_literal(r"a\b"), r"a\\b");
        assert_eq!(escape_literal("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_literal("it's"), "it\\'s");
        assert_eq!(escape_literal("line1\nline2"), "line1\\nline2");
        assert_eq!(escape_literal("tab\there"), "tab\\there");
        // Backslash first: an embedded quote after a backslash doubles
        // without eating the quote escape.
        assert_eq!(escape_literal("\\\""), "\\\\\\\"");
    }
}
