//! In-memory symbol registry for Pass-2 resolution.
//!
//! A multi-index from lookup keys to entities, rebuilt from scratch on every
//! extraction run. Keys cover bare names, class/module qualified callables,
//! file/module/template/style path aliases, and Angular selectors. On key
//! collision the more specific entity wins: +2 for a class context, +1 for a
//! module context, ties keeping the earlier insertion.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::types::{posix_path, Entity, EntityKind};

/// A registered symbol: enough of the entity to rewrite edges and compute
/// resolved paths without holding the full parse results.
#[derive(Debug, Clone)]
pub struct RegisteredSymbol {
    pub entity_id: String,
    pub name: String,
    pub kind: EntityKind,
    pub file_path: String,
    specificity: i32,
}

/// Multi-index symbol registry.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    project_root: String,
    by_key: BTreeMap<String, RegisteredSymbol>,
}

impl SymbolRegistry {
    pub fn new(project_root: &str) -> Self {
        Self {
            project_root: posix_path(project_root),
            by_key: BTreeMap::new(),
        }
    }

    /// Build the registry from all Pass-1 entities.
    ///
    /// Two passes: the id → name map first, so qualified keys like
    /// `ClassName.method` can be derived from `class_id` attributes.
    pub fn build<'e>(
        project_root: &str,
        entities: impl Iterator<Item = &'e Entity> + Clone,
    ) -> Self {
        let mut registry = Self::new(project_root);
        let names_by_id: HashMap<String, String> = entities
            .clone()
            .map(|e| (e.id.clone(), e.name.clone()))
            .collect();
        for entity in entities {
            registry.register(entity, &names_by_id);
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Register one entity under all of its lookup keys. `names_by_id`
    /// supplies parent names for qualified keys; pass an empty map when
    /// inserting store-loaded entities lazily (their bare keys suffice).
    pub fn register(&mut self, entity: &Entity, names_by_id: &HashMap<String, String>) {
        let specificity = specificity_of(entity);
        let symbol = RegisteredSymbol {
            entity_id: entity.id.clone(),
            name: entity.name.clone(),
            kind: entity.kind,
            file_path: posix_path(&entity.file_path),
            specificity,
        };

        self.insert_key(entity.name.clone(), &symbol);

        if is_callable(entity.kind) {
            if let Some(class_name) = entity
                .attr_str("class_id")
                .and_then(|id| names_by_id.get(id))
            {
                self.insert_key(format!("{class_name}.{}", entity.name), &symbol);
            }
            if let Some(module_name) = entity
                .attr_str("module_id")
                .and_then(|id| names_by_id.get(id))
            {
                self.insert_key(format!("{module_name}.{}", entity.name), &symbol);
            }
        }

        match entity.kind {
            EntityKind::File => self.register_file(entity, &symbol),
            EntityKind::AngularComponent => {
                let selector = entity.attr_str("selector").unwrap_or(&entity.name);
                self.insert_key(format!("selector:{selector}"), &symbol);
            }
            _ => {}
        }
    }

    /// Path-alias keys for a File entity: `file:` by absolute and
    /// root-relative path, `module:` by stem and relative path, and
    /// `template:`/`style:` aliases for markup and stylesheet files.
    fn register_file(&mut self, entity: &Entity, symbol: &RegisteredSymbol) {
        let absolute = posix_path(&entity.file_path);
        let relative = absolute
            .strip_prefix(&format!("{}/", self.project_root))
            .map(str::to_string);
        let stem = Path::new(&absolute)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());

        self.insert_key(format!("file:{absolute}"), symbol);
        if let Some(rel) = &relative {
            self.insert_key(format!("file:{rel}"), symbol);
        }
        if let Some(stem) = &stem {
            self.insert_key(format!("module:{stem}"), symbol);
        }
        if let Some(rel) = &relative {
            self.insert_key(format!("module:./{rel}"), symbol);
            self.insert_key(format!("module:{rel}"), symbol);
            // Extension-less module alias for script imports.
            if let Some(no_ext) = strip_extension(rel) {
                self.insert_key(format!("module:./{no_ext}"), symbol);
                self.insert_key(format!("module:{no_ext}"), symbol);
            }
        }

        let language = entity.attr_str("language").unwrap_or_default();
        let asset_prefix = match language {
            "html" => Some("template"),
            "css" => Some("style"),
            _ => None,
        };
        if let Some(prefix) = asset_prefix {
            self.insert_key(format!("{prefix}:{}", entity.name), symbol);
            self.insert_key(format!("{prefix}:{absolute}"), symbol);
            if let Some(rel) = &relative {
                self.insert_key(format!("{prefix}:{rel}"), symbol);
                self.insert_key(format!("{prefix}:./{rel}"), symbol);
            }
        }
    }

    fn insert_key(&mut self, key: String, symbol: &RegisteredSymbol) {
        match self.by_key.get(&key) {
            Some(existing) if existing.specificity >= symbol.specificity => {}
            _ => {
                self.by_key.insert(key, symbol.clone());
            }
        }
    }

    /// Exact key lookup.
    pub fn get(&self, key: &str) -> Option<&RegisteredSymbol> {
        self.by_key.get(key)
    }

    /// Name lookup with qualified-name fallback: a direct hit first, then
    /// the first (deterministic, sorted-key order) registered key that
    /// matches as a dotted suffix or prefix of `name`.
    pub fn resolve_name(&self, name: &str) -> Option<&RegisteredSymbol> {
        if let Some(symbol) = self.by_key.get(name) {
            return Some(symbol);
        }
        let dotted_suffix = format!(".{name}");
        self.by_key
            .iter()
            .find(|(key, _)| {
                !key.contains(':')
                    && (key.ends_with(&dotted_suffix) || name.ends_with(&format!(".{key}")))
            })
            .map(|(_, symbol)| symbol)
    }
}

fn specificity_of(entity: &Entity) -> i32 {
    let mut score = 0;
    if entity
        .attr_str("class_id")
        .map(|v| !v.is_empty())
        .unwrap_or(false)
    {
        score += 2;
    }
    if entity
        .attr_str("module_id")
        .map(|v| !v.is_empty())
        .unwrap_or(false)
    {
        score += 1;
    }
    score
}

fn is_callable(kind: EntityKind) -> bool {
    matches!(
        kind,
        EntityKind::Function
            | EntityKind::Method
            | EntityKind::Constructor
            | EntityKind::Getter
            | EntityKind::Setter
    )
}

fn strip_extension(path: &str) -> Option<String> {
    let dot = path.rfind('.')?;
    let slash = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    if dot > slash {
        Some(path[..dot].to_string())
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
