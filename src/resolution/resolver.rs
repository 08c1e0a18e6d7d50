//! Pass-2 reference resolution.
//!
//! Rewrites every `unresolved:<tag>_<raw>` edge endpoint to a concrete
//! entity id — either a registry hit or a freshly synthesized external stub
//! inserted into the owning file's result. The store never receives a
//! dangling reference. During incremental runs a fallback symbol source
//! (the store) is consulted lazily on registry misses so references from
//! reparsed files can land on entities in untouched files.

use std::collections::HashSet;
use std::path::Path;

use md5::{Digest, Md5};
use serde_json::{Map, Value};

use crate::resolution::registry::{RegisteredSymbol, SymbolRegistry};
use crate::types::{
    external_stub_id, join_normalized, parse_unresolved, Entity, EntityKind, ParseResult, RefTag,
};

/// Maximum surface length of a stub name before truncation kicks in.
const MAX_REFERENCE_NAME: usize = 100;
/// Truncation target; the tail is cut at the last `.` inside this window.
const TRUNCATED_PREFIX: usize = 90;

/// Packages always treated as external, regardless of shape. The general
/// rule (anything not starting with `./` or `../`) subsumes these; the list
/// documents the common npm ecosystem and short-circuits classification.
const WELL_KNOWN_PACKAGES: &[&str] = &[
    "react",
    "react-dom",
    "vue",
    "express",
    "lodash",
    "rxjs",
    "zone.js",
    "tslib",
    "axios",
    "moment",
    "jquery",
];

/// Lazy symbol lookup against persisted entities, used on registry misses
/// during incremental runs. Implemented by the store adapter.
pub trait SymbolSource {
    /// Entities whose name or file path matches `term` exactly.
    fn lookup_entities(&self, term: &str) -> Vec<Entity>;
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct Resolver<'a> {
    registry: SymbolRegistry,
    fallback: Option<&'a dyn SymbolSource>,
    /// Terms already sent to the fallback source, hit or miss.
    fetched: HashSet<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: SymbolRegistry) -> Self {
        Self {
            registry,
            fallback: None,
            fetched: HashSet::new(),
        }
    }

    /// A resolver that consults `source` on registry misses.
    pub fn with_fallback(registry: SymbolRegistry, source: &'a dyn SymbolSource) -> Self {
        Self {
            registry,
            fallback: Some(source),
            fetched: HashSet::new(),
        }
    }

    /// Resolve every unresolved endpoint in `results`. Stub entities are
    /// appended to the result that owns the referencing edge.
    pub fn resolve_results(&mut self, mut results: Vec<ParseResult>) -> Vec<ParseResult> {
        for result in &mut results {
            let owning_file = result.file_path.clone();
            let mut stubs: Vec<Entity> = Vec::new();
            for relationship in &mut result.relationships {
                for endpoint in [&mut relationship.from_id, &mut relationship.to_id] {
                    let Some((tag, raw)) = parse_unresolved(endpoint).map(|(t, r)| (t, r.to_string()))
                    else {
                        continue;
                    };
                    let resolution =
                        self.resolve_endpoint(tag, &raw, &mut relationship.metadata, &owning_file);
                    *endpoint = resolution.id;
                    if let Some(stub) = resolution.stub {
                        stubs.push(stub);
                    }
                }
            }
            result.entities.extend(stubs);
        }
        results
    }

    // -- per-tag resolution -------------------------------------------------

    fn resolve_endpoint(
        &mut self,
        tag: RefTag,
        raw: &str,
        metadata: &mut Map<String, Value>,
        owning_file: &str,
    ) -> Resolution {
        match tag {
            RefTag::Module => self.resolve_module(raw, owning_file),
            RefTag::Template => self.resolve_asset(raw, "template", metadata, owning_file),
            RefTag::Style => self.resolve_asset(raw, "style", metadata, owning_file),
            RefTag::Function => {
                self.resolve_symbol(raw, EntityKind::ExternalFunction, tag, owning_file)
            }
            RefTag::Property => {
                self.resolve_symbol(raw, EntityKind::ExternalProperty, tag, owning_file)
            }
            RefTag::External => {
                self.resolve_symbol(raw, EntityKind::ExternalSymbol, tag, owning_file)
            }
            RefTag::Export => {
                self.resolve_symbol(raw, EntityKind::ExternalExport, tag, owning_file)
            }
            RefTag::InlineTemplate => self.stub(
                EntityKind::ExternalTemplate,
                &format!("inline_template_{raw}"),
                tag,
                owning_file,
            ),
            RefTag::InlineStyles => self.stub(
                EntityKind::ExternalStyle,
                &format!("inline_styles_{raw}"),
                tag,
                owning_file,
            ),
            RefTag::AngularComponent => self.resolve_component_tag(raw, owning_file),
        }
    }

    /// External packages become `ExternalModule` stubs; local specifiers are
    /// tried against `module:` and `file:` aliases.
    fn resolve_module(&mut self, raw: &str, owning_file: &str) -> Resolution {
        if is_external_module(raw) {
            return self.stub(EntityKind::ExternalModule, raw, RefTag::Module, owning_file);
        }
        let stripped = raw.strip_prefix("./").unwrap_or(raw);
        let keys = [
            format!("module:{raw}"),
            format!("module:{stripped}"),
            format!("file:{raw}"),
        ];
        for key in &keys {
            if let Some(symbol) = self.lookup_key(key) {
                return Resolution::hit(symbol.entity_id);
            }
        }
        // Relative specifiers resolve against the importing file's directory.
        let dir = parent_dir(owning_file);
        let joined = join_normalized(&dir, raw);
        for key in [format!("module:{joined}"), format!("file:{joined}")] {
            if let Some(symbol) = self.lookup_key(&key) {
                return Resolution::hit(symbol.entity_id);
            }
        }
        self.stub(EntityKind::ExternalModule, raw, RefTag::Module, owning_file)
    }

    /// Template/style resolution through the deterministic pattern list.
    /// On a hit, `resolved_path` in the edge metadata is rewritten to the
    /// matched file's path.
    fn resolve_asset(
        &mut self,
        raw: &str,
        prefix: &str,
        metadata: &mut Map<String, Value>,
        owning_file: &str,
    ) -> Resolution {
        let component_file = metadata
            .get("component_file_path")
            .and_then(Value::as_str)
            .unwrap_or(owning_file)
            .to_string();

        for pattern in asset_patterns(raw, &component_file) {
            for key in [format!("{prefix}:{pattern}"), format!("file:{pattern}")] {
                if let Some(symbol) = self.lookup_key(&key) {
                    metadata.insert(
                        "resolved_path".into(),
                        Value::from(symbol.file_path.clone()),
                    );
                    return Resolution::hit(symbol.entity_id);
                }
            }
        }

        let kind = if prefix == "template" {
            EntityKind::ExternalTemplate
        } else {
            EntityKind::ExternalStyle
        };
        let tag = if prefix == "template" {
            RefTag::Template
        } else {
            RefTag::Style
        };
        self.stub(kind, raw, tag, owning_file)
    }

    /// Name references (calls, accesses, imports of symbols, exports):
    /// exact name, then qualified suffix/prefix match, then a typed stub.
    fn resolve_symbol(
        &mut self,
        raw: &str,
        stub_kind: EntityKind,
        tag: RefTag,
        owning_file: &str,
    ) -> Resolution {
        if let Some(symbol) = self.lookup_name(raw) {
            return Resolution::hit(symbol.entity_id);
        }
        self.stub(stub_kind, raw, tag, owning_file)
    }

    /// `<app-*>` tags from templates resolve by component selector.
    fn resolve_component_tag(&mut self, raw: &str, owning_file: &str) -> Resolution {
        if let Some(symbol) = self.lookup_key(&format!("selector:{raw}")) {
            return Resolution::hit(symbol.entity_id);
        }
        if let Some(symbol) = self.lookup_name(raw) {
            return Resolution::hit(symbol.entity_id);
        }
        self.stub(
            EntityKind::ExternalReference,
            raw,
            RefTag::AngularComponent,
            owning_file,
        )
    }

    // -- registry access with lazy store fallback ---------------------------

    fn lookup_key(&mut self, key: &str) -> Option<RegisteredSymbol> {
        if let Some(symbol) = self.registry.get(key) {
            return Some(symbol.clone());
        }
        let term = key.split_once(':').map(|(_, t)| t).unwrap_or(key);
        self.fetch_from_fallback(term);
        self.registry.get(key).cloned()
    }

    fn lookup_name(&mut self, name: &str) -> Option<RegisteredSymbol> {
        if let Some(symbol) = self.registry.resolve_name(name) {
            return Some(symbol.clone());
        }
        self.fetch_from_fallback(name);
        // Qualified calls miss on the full path but may land on the final
        // segment (`self.f` → `f`).
        if let Some(last) = name.rsplit('.').next() {
            if last != name {
                self.fetch_from_fallback(last);
            }
        }
        self.registry.resolve_name(name).cloned()
    }

    fn fetch_from_fallback(&mut self, term: &str) {
        let Some(source) = self.fallback else {
            return;
        };
        let mut terms: Vec<String> = vec![term.to_string()];
        if let Some(name) = Path::new(term).file_name().and_then(|n| n.to_str()) {
            if name != term {
                terms.push(name.to_string());
            }
        }
        let empty = std::collections::HashMap::new();
        for term in terms {
            if !self.fetched.insert(term.clone()) {
                continue;
            }
            for entity in source.lookup_entities(&term) {
                self.registry.register(&entity, &empty);
            }
        }
    }

    // -- stubs --------------------------------------------------------------

    fn stub(
        &mut self,
        kind: EntityKind,
        raw: &str,
        tag: RefTag,
        owning_file: &str,
    ) -> Resolution {
        let name = truncate_reference_name(raw);
        let id = external_stub_id(kind.as_str(), &name);

        let mut metadata = Map::new();
        metadata.insert("is_external".into(), true.into());
        metadata.insert("reference_type".into(), tag.as_str().into());
        if name != raw {
            metadata.insert("original_reference".into(), raw.into());
        }

        let entity = Entity {
            id: id.clone(),
            name,
            kind,
            file_path: owning_file.to_string(),
            line_start: 0,
            line_end: 0,
            metadata,
        };
        Resolution {
            id,
            stub: Some(entity),
        }
    }
}

struct Resolution {
    id: String,
    stub: Option<Entity>,
}

impl Resolution {
    fn hit(id: String) -> Self {
        Self { id, stub: None }
    }
}

// ---------------------------------------------------------------------------
// Classification and patterns
// ---------------------------------------------------------------------------

/// Whether a module specifier refers to an external package.
pub fn is_external_module(specifier: &str) -> bool {
    specifier.starts_with('@')
        || specifier.starts_with("node_modules")
        || WELL_KNOWN_PACKAGES.contains(&specifier)
        || !(specifier.starts_with("./") || specifier.starts_with("../"))
}

/// The deterministic pattern list for template/style references (§ tested
/// below): the raw path, the component-relative absolute form, basename and
/// `src/app` suffixes for absolute paths, and `./`-stripped + basename forms
/// for relative ones. Duplicates removed, first-seen order kept.
pub fn asset_patterns(raw: &str, component_file: &str) -> Vec<String> {
    let mut patterns: Vec<String> = vec![raw.to_string()];
    let is_absolute = raw.starts_with('/');

    if !is_absolute && !component_file.is_empty() {
        let dir = parent_dir(component_file);
        patterns.push(join_normalized(&dir, raw));
    }

    if is_absolute {
        if let Some(name) = Path::new(raw).file_name().and_then(|n| n.to_str()) {
            patterns.push(name.to_string());
        }
        if let Some(index) = raw.find("src/app/") {
            let suffix = &raw[index + "src/app/".len()..];
            if !suffix.is_empty() {
                patterns.push(suffix.to_string());
                patterns.push(format!("./{suffix}"));
            }
        }
    } else {
        patterns.push(raw.trim_start_matches("./").to_string());
        if let Some(name) = Path::new(raw).file_name().and_then(|n| n.to_str()) {
            patterns.push(name.to_string());
        }
    }

    let mut seen = HashSet::new();
    patterns.retain(|p| seen.insert(p.clone()));
    patterns
}

/// Truncate over-long reference names (deep fluent chains) to a stable
/// short form: the first 90 characters cut back to the last `.`, suffixed
/// with `…` and 8 hex chars of the full name's MD5.
pub fn truncate_reference_name(raw: &str) -> String {
    if raw.chars().count() <= MAX_REFERENCE_NAME {
        return raw.to_string();
    }
    let prefix: String = raw.chars().take(TRUNCATED_PREFIX).collect();
    let head = match prefix.rfind('.') {
        Some(dot) if dot > 0 => &prefix[..dot],
        _ => prefix.as_str(),
    };
    let digest = hex::encode(Md5::digest(raw.as_bytes()));
    format!("{head}…{}", &digest[..8])
}

fn parent_dir(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{unresolved, RelKind, Relationship};
    use serde_json::Map;

    fn entity(kind: EntityKind, name: &str, file: &str) -> Entity {
        Entity {
            id: format!("id-{kind}-{name}"),
            name: name.to_string(),
            kind,
            file_path: file.to_string(),
            line_start: 1,
            line_end: 5,
            metadata: Map::new(),
        }
    }

    fn result_with(
        file_path: &str,
        entities: Vec<Entity>,
        relationships: Vec<Relationship>,
    ) -> ParseResult {
        ParseResult {
            file_path: file_path.to_string(),
            entities,
            relationships,
            file_hash: "h".into(),
            errors: Vec::new(),
            parse_time: std::time::Duration::ZERO,
        }
    }

    // -- classification ------------------------------------------------------

    #[test]
    fn external_module_classification() {
        assert!(is_external_module("@angular/core"));
        assert!(is_external_module("node_modules/lodash"));
        assert!(is_external_module("rxjs"));
        assert!(is_external_module("some-package"));
        assert!(!is_external_module("./utils"));
        assert!(!is_external_module("../shared/api"));
    }

    // -- pattern list --------------------------------------------------------

    #[test]
    fn relative_asset_patterns() {
        let patterns = asset_patterns("./x.html", "/proj/src/app/x/x.component.ts");
        assert_eq!(
            patterns,
            vec![
                "./x.html".to_string(),
                "/proj/src/app/x/x.html".to_string(),
                "x.html".to_string(),
            ]
        );
        assert!(patterns.len() < 12);
    }

    #[test]
    fn absolute_asset_patterns_include_app_suffix() {
        let patterns = asset_patterns(
            "/proj/src/app/shared/nav.html",
            "/proj/src/app/shared/nav.component.ts",
        );
        assert_eq!(patterns[0], "/proj/src/app/shared/nav.html");
        assert!(patterns.contains(&"nav.html".to_string()));
        assert!(patterns.contains(&"shared/nav.html".to_string()));
        assert!(patterns.contains(&"./shared/nav.html".to_string()));
        assert!(patterns.len() < 12);
    }

    #[test]
    fn patterns_deduplicate_preserving_order() {
        // basename == raw, so the list collapses.
        let patterns = asset_patterns("x.html", "");
        assert_eq!(patterns, vec!["x.html".to_string()]);
    }

    // -- truncation ----------------------------------------------------------

    #[test]
    fn short_names_pass_through() {
        assert_eq!(truncate_reference_name("foo.bar"), "foo.bar");
    }

    #[test]
    fn long_names_truncate_deterministically() {
        let long: String = (0..30)
            .map(|i| format!("segment{i}"))
            .collect::<Vec<_>>()
            .join(".");
        assert!(long.len() > 100);

        let first = truncate_reference_name(&long);
        let second = truncate_reference_name(&long);
        assert_eq!(first, second, "truncation must be byte-identical");
        assert!(first.contains('…'));
        assert!(first.len() < long.len());

        // Distinct long names stay distinct through the digest suffix.
        let other = format!("{long}.tail");
        assert_ne!(truncate_reference_name(&other), first);
    }

    // -- endpoint resolution -------------------------------------------------

    #[test]
    fn resolves_call_to_local_function() {
        let func = entity(EntityKind::Function, "helper", "/p/a.py");
        let registry = SymbolRegistry::build("/p", [func].iter());
        let mut resolver = Resolver::new(registry);

        let rel = Relationship::new("caller", unresolved(RefTag::Function, "helper"), RelKind::Calls);
        let results = resolver.resolve_results(vec![result_with("/p/a.py", vec![], vec![rel])]);

        assert_eq!(results[0].relationships[0].to_id, "id-Function-helper");
        assert!(results[0].entities.is_empty(), "no stub for a hit");
    }

    #[test]
    fn qualified_call_resolves_by_suffix() {
        let func = entity(EntityKind::Function, "f", "/p/a.py");
        let registry = SymbolRegistry::build("/p", [func].iter());
        let mut resolver = Resolver::new(registry);

        let rel = Relationship::new("caller", unresolved(RefTag::Function, "self.f"), RelKind::Calls);
        let results = resolver.resolve_results(vec![result_with("/p/a.py", vec![], vec![rel])]);
        assert_eq!(results[0].relationships[0].to_id, "id-Function-f");
    }

    #[test]
    fn missing_function_becomes_typed_stub() {
        let mut resolver = Resolver::new(SymbolRegistry::new("/p"));
        let rel = Relationship::new(
            "caller",
            unresolved(RefTag::Function, "console.log"),
            RelKind::Calls,
        );
        let results = resolver.resolve_results(vec![result_with("/p/a.ts", vec![], vec![rel])]);

        let stub = &results[0].entities[0];
        assert_eq!(stub.kind, EntityKind::ExternalFunction);
        assert_eq!(stub.name, "console.log");
        assert_eq!(results[0].relationships[0].to_id, stub.id);
        assert_eq!(stub.metadata.get("is_external"), Some(&Value::from(true)));
    }

    #[test]
    fn external_package_import_becomes_module_stub() {
        let mut resolver = Resolver::new(SymbolRegistry::new("/p"));
        let rel = Relationship::new(
            "file-id",
            unresolved(RefTag::Module, "@angular/core"),
            RelKind::Imports,
        );
        let results = resolver.resolve_results(vec![result_with("/p/a.ts", vec![], vec![rel])]);

        let stub = &results[0].entities[0];
        assert_eq!(stub.kind, EntityKind::ExternalModule);
        assert_eq!(stub.name, "@angular/core");
        assert_eq!(results[0].relationships[0].to_id, stub.id);
    }

    #[test]
    fn relative_import_resolves_to_local_file() {
        let mut util = entity(EntityKind::File, "util.ts", "/p/src/util.ts");
        util.set_attr("language", "typescript");
        let registry = SymbolRegistry::build("/p", [util].iter());
        let mut resolver = Resolver::new(registry);

        let rel = Relationship::new(
            "file-id",
            unresolved(RefTag::Module, "./util"),
            RelKind::Imports,
        );
        let results =
            resolver.resolve_results(vec![result_with("/p/src/main.ts", vec![], vec![rel])]);
        assert_eq!(results[0].relationships[0].to_id, "id-File-util.ts");
    }

    #[test]
    fn template_resolves_with_resolved_path_rewrite() {
        let mut html = entity(EntityKind::File, "x.html", "/proj/src/app/x/x.html");
        html.set_attr("language", "html");
        let registry = SymbolRegistry::build("/proj", [html].iter());
        let mut resolver = Resolver::new(registry);

        let rel = Relationship::new(
            "component-id",
            unresolved(RefTag::Template, "./x.html"),
            RelKind::UsesTemplate,
        )
        .with_attr("template_path", "./x.html")
        .with_attr("component_file_path", "/proj/src/app/x/x.component.ts");

        let results = resolver.resolve_results(vec![result_with(
            "/proj/src/app/x/x.component.ts",
            vec![],
            vec![rel],
        )]);

        let resolved = &results[0].relationships[0];
        assert_eq!(resolved.to_id, "id-File-x.html");
        assert_eq!(
            resolved.metadata.get("resolved_path"),
            Some(&Value::from("/proj/src/app/x/x.html"))
        );
    }

    #[test]
    fn missing_template_becomes_external_template_stub() {
        let mut resolver = Resolver::new(SymbolRegistry::new("/p"));
        let rel = Relationship::new(
            "component-id",
            unresolved(RefTag::Template, "./missing.html"),
            RelKind::UsesTemplate,
        )
        .with_attr("component_file_path", "/p/src/a.component.ts");
        let results = resolver.resolve_results(vec![result_with("/p/src/a.component.ts", vec![], vec![rel])]);

        let stub = &results[0].entities[0];
        assert_eq!(stub.kind, EntityKind::ExternalTemplate);
        assert_eq!(stub.name, "./missing.html");
    }

    #[test]
    fn inline_keys_map_to_asset_stubs() {
        let mut resolver = Resolver::new(SymbolRegistry::new("/p"));
        let rel = Relationship::new(
            "component-id",
            unresolved(RefTag::InlineStyles, "abc123"),
            RelKind::UsesStyles,
        );
        let results = resolver.resolve_results(vec![result_with("/p/a.ts", vec![], vec![rel])]);
        let stub = &results[0].entities[0];
        assert_eq!(stub.kind, EntityKind::ExternalStyle);
        assert_eq!(stub.name, "inline_styles_abc123");
    }

    #[test]
    fn component_tag_resolves_by_selector() {
        let mut component = entity(EntityKind::AngularComponent, "app-nav", "/p/nav.component.ts");
        component.set_attr("selector", "app-nav");
        let registry = SymbolRegistry::build("/p", [component].iter());
        let mut resolver = Resolver::new(registry);

        let rel = Relationship::new(
            "template-file",
            unresolved(RefTag::AngularComponent, "app-nav"),
            RelKind::UsesComponent,
        );
        let results = resolver.resolve_results(vec![result_with("/p/nav.html", vec![], vec![rel])]);
        assert_eq!(
            results[0].relationships[0].to_id,
            "id-AngularComponent-app-nav"
        );
    }

    #[test]
    fn unresolved_from_endpoint_is_rewritten_too() {
        let mut resolver = Resolver::new(SymbolRegistry::new("/p"));
        let rel = Relationship::new(
            unresolved(RefTag::External, "staticmethod"),
            "function-id",
            RelKind::Decorates,
        );
        let results = resolver.resolve_results(vec![result_with("/p/a.py", vec![], vec![rel])]);
        let stub = &results[0].entities[0];
        assert_eq!(stub.kind, EntityKind::ExternalSymbol);
        assert_eq!(results[0].relationships[0].from_id, stub.id);
    }

    #[test]
    fn identical_references_share_one_stub_id() {
        let mut resolver = Resolver::new(SymbolRegistry::new("/p"));
        let rel_a = Relationship::new("a", unresolved(RefTag::Function, "fetch"), RelKind::Calls);
        let rel_b = Relationship::new("b", unresolved(RefTag::Function, "fetch"), RelKind::Calls);
        let results = resolver.resolve_results(vec![
            result_with("/p/a.ts", vec![], vec![rel_a]),
            result_with("/p/b.ts", vec![], vec![rel_b]),
        ]);
        assert_eq!(
            results[0].relationships[0].to_id,
            results[1].relationships[0].to_id
        );
    }

    // -- lazy fallback -------------------------------------------------------

    struct MapSource(Vec<Entity>);

    impl SymbolSource for MapSource {
        fn lookup_entities(&self, term: &str) -> Vec<Entity> {
            self.0
                .iter()
                .filter(|e| e.name == term || e.file_path == term)
                .cloned()
                .collect()
        }
    }

    #[test]
    fn fallback_loads_symbols_on_miss() {
        let source = MapSource(vec![entity(EntityKind::Function, "stored_fn", "/p/old.py")]);
        let mut resolver = Resolver::with_fallback(SymbolRegistry::new("/p"), &source);

        let rel = Relationship::new(
            "caller",
            unresolved(RefTag::Function, "stored_fn"),
            RelKind::Calls,
        );
        let results = resolver.resolve_results(vec![result_with("/p/new.py", vec![], vec![rel])]);
        assert_eq!(results[0].relationships[0].to_id, "id-Function-stored_fn");
        assert!(results[0].entities.is_empty());
    }
}
