//! Core domain types for CodeAtlas.
//!
//! Everything the pipeline exchanges lives here: the language tags produced
//! by the classifier, the closed sums of entity and relationship kinds, the
//! entity/relationship intermediate representation emitted by parsers, and
//! the deterministic identifier derivation shared by every component.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// FileKind
// ---------------------------------------------------------------------------

/// Language tag assigned by the classifier.
///
/// `Angular` marks TypeScript files with framework-specific composite
/// suffixes (`.component.ts` and friends); they parse with the TypeScript
/// grammar but the tag survives into File metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Python,
    JavaScript,
    TypeScript,
    Angular,
    Html,
    Css,
    Dockerfile,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Angular => "angular",
            Self::Html => "html",
            Self::Css => "css",
            Self::Dockerfile => "dockerfile",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "python" => Some(Self::Python),
            "javascript" | "js" => Some(Self::JavaScript),
            "typescript" | "ts" => Some(Self::TypeScript),
            "angular" => Some(Self::Angular),
            "html" => Some(Self::Html),
            "css" | "scss" | "sass" => Some(Self::Css),
            "dockerfile" => Some(Self::Dockerfile),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// Kinds of entities in the code graph.
///
/// A closed sum: parsers may only emit these tags, and the resolver treats
/// any kind it has no special rule for uniformly. The `External*` variants
/// are synthesized by the resolver for references without a local
/// definition — they are real, persisted entities, never dangling IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    File,
    Module,
    Class,
    Interface,
    Enum,
    TypeAlias,
    Function,
    Method,
    Constructor,
    Getter,
    Setter,
    Variable,
    Import,
    Export,
    Decorator,
    // Framework variants, projected from decorators.
    AngularComponent,
    AngularService,
    AngularDirective,
    AngularPipe,
    AngularModule,
    AngularInput,
    AngularOutput,
    // External stubs, synthesized by the resolver.
    ExternalFunction,
    ExternalProperty,
    ExternalModule,
    ExternalExport,
    ExternalSymbol,
    ExternalReference,
    ExternalTemplate,
    ExternalStyle,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Module => "Module",
            Self::Class => "Class",
            Self::Interface => "Interface",
            Self::Enum => "Enum",
            Self::TypeAlias => "TypeAlias",
            Self::Function => "Function",
            Self::Method => "Method",
            Self::Constructor => "Constructor",
            Self::Getter => "Getter",
            Self::Setter => "Setter",
            Self::Variable => "Variable",
            Self::Import => "Import",
            Self::Export => "Export",
            Self::Decorator => "Decorator",
            Self::AngularComponent => "AngularComponent",
            Self::AngularService => "AngularService",
            Self::AngularDirective => "AngularDirective",
            Self::AngularPipe => "AngularPipe",
            Self::AngularModule => "AngularModule",
            Self::AngularInput => "AngularInput",
            Self::AngularOutput => "AngularOutput",
            Self::ExternalFunction => "ExternalFunction",
            Self::ExternalProperty => "ExternalProperty",
            Self::ExternalModule => "ExternalModule",
            Self::ExternalExport => "ExternalExport",
            Self::ExternalSymbol => "ExternalSymbol",
            Self::ExternalReference => "ExternalReference",
            Self::ExternalTemplate => "ExternalTemplate",
            Self::ExternalStyle => "ExternalStyle",
        }
    }

    /// The suffix used in containment relationship names
    /// (`FILE_CONTAINS_<SUFFIX>`).
    pub fn containment_suffix(&self) -> &'static str {
        match self {
            Self::File => "FILE",
            Self::Module => "MODULE",
            Self::Class => "CLASS",
            Self::Interface => "INTERFACE",
            Self::Enum => "ENUM",
            Self::TypeAlias => "TYPEALIAS",
            Self::Function => "FUNCTION",
            Self::Method => "METHOD",
            Self::Constructor => "CONSTRUCTOR",
            Self::Getter => "GETTER",
            Self::Setter => "SETTER",
            Self::Variable => "VARIABLE",
            Self::Import => "IMPORT",
            Self::Export => "EXPORT",
            Self::Decorator => "DECORATOR",
            Self::AngularComponent => "ANGULARCOMPONENT",
            Self::AngularService => "ANGULARSERVICE",
            Self::AngularDirective => "ANGULARDIRECTIVE",
            Self::AngularPipe => "ANGULARPIPE",
            Self::AngularModule => "ANGULARMODULE",
            Self::AngularInput => "ANGULARINPUT",
            Self::AngularOutput => "ANGULAROUTPUT",
            Self::ExternalFunction => "EXTERNALFUNCTION",
            Self::ExternalProperty => "EXTERNALPROPERTY",
            Self::ExternalModule => "EXTERNALMODULE",
            Self::ExternalExport => "EXTERNALEXPORT",
            Self::ExternalSymbol => "EXTERNALSYMBOL",
            Self::ExternalReference => "EXTERNALREFERENCE",
            Self::ExternalTemplate => "EXTERNALTEMPLATE",
            Self::ExternalStyle => "EXTERNALSTYLE",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        ALL_ENTITY_KINDS.iter().copied().find(|k| k.as_str() == s)
    }

    /// Whether this kind is a resolver-synthesized external stub.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::ExternalFunction
                | Self::ExternalProperty
                | Self::ExternalModule
                | Self::ExternalExport
                | Self::ExternalSymbol
                | Self::ExternalReference
                | Self::ExternalTemplate
                | Self::ExternalStyle
        )
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every entity kind, for exhaustive iteration in tests and schema checks.
pub const ALL_ENTITY_KINDS: [EntityKind; 30] = [
    EntityKind::File,
    EntityKind::Module,
    EntityKind::Class,
    EntityKind::Interface,
    EntityKind::Enum,
    EntityKind::TypeAlias,
    EntityKind::Function,
    EntityKind::Method,
    EntityKind::Constructor,
    EntityKind::Getter,
    EntityKind::Setter,
    EntityKind::Variable,
    EntityKind::Import,
    EntityKind::Export,
    EntityKind::Decorator,
    EntityKind::AngularComponent,
    EntityKind::AngularService,
    EntityKind::AngularDirective,
    EntityKind::AngularPipe,
    EntityKind::AngularModule,
    EntityKind::AngularInput,
    EntityKind::AngularOutput,
    EntityKind::ExternalFunction,
    EntityKind::ExternalProperty,
    EntityKind::ExternalModule,
    EntityKind::ExternalExport,
    EntityKind::ExternalSymbol,
    EntityKind::ExternalReference,
    EntityKind::ExternalTemplate,
    EntityKind::ExternalStyle,
];

// ---------------------------------------------------------------------------
// ScopeKind / RelKind
// ---------------------------------------------------------------------------

/// Containing scopes that can own entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    File,
    Module,
    Class,
    Function,
}

impl ScopeKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::File => "FILE_CONTAINS_",
            Self::Module => "MODULE_CONTAINS_",
            Self::Class => "CLASS_CONTAINS_",
            Self::Function => "FUNCTION_CONTAINS_",
        }
    }
}

/// Typed, directed relationship kinds.
///
/// Containment is a parametric family (`FILE_CONTAINS_<KIND>` and the
/// module/class/function equivalents); everything else is a fixed tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelKind {
    Contains(ScopeKind, EntityKind),
    Calls,
    Uses,
    Accesses,
    Imports,
    ImportsStyle,
    Exports,
    Inherits,
    Extends,
    Implements,
    Decorates,
    UsesTemplate,
    UsesStyles,
    UsesComponent,
}

impl RelKind {
    /// The wire/storage name, e.g. `FILE_CONTAINS_CLASS` or `CALLS`.
    pub fn name(&self) -> String {
        match self {
            Self::Contains(scope, kind) => {
                format!("{}{}", scope.prefix(), kind.containment_suffix())
            }
            Self::Calls => "CALLS".to_string(),
            Self::Uses => "USES".to_string(),
            Self::Accesses => "ACCESSES".to_string(),
            Self::Imports => "IMPORTS".to_string(),
            Self::ImportsStyle => "IMPORTS_STYLE".to_string(),
            Self::Exports => "EXPORTS".to_string(),
            Self::Inherits => "INHERITS".to_string(),
            Self::Extends => "EXTENDS".to_string(),
            Self::Implements => "IMPLEMENTS".to_string(),
            Self::Decorates => "DECORATES".to_string(),
            Self::UsesTemplate => "USES_TEMPLATE".to_string(),
            Self::UsesStyles => "USES_STYLES".to_string(),
            Self::UsesComponent => "USES_COMPONENT".to_string(),
        }
    }

    /// Parse a storage name back into a kind. Containment names with an
    /// unknown suffix return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        for scope in [
            ScopeKind::File,
            ScopeKind::Module,
            ScopeKind::Class,
            ScopeKind::Function,
        ] {
            if let Some(suffix) = s.strip_prefix(scope.prefix()) {
                let kind = ALL_ENTITY_KINDS
                    .iter()
                    .copied()
                    .find(|k| k.containment_suffix() == suffix)?;
                return Some(Self::Contains(scope, kind));
            }
        }
        match s {
            "CALLS" => Some(Self::Calls),
            "USES" => Some(Self::Uses),
            "ACCESSES" => Some(Self::Accesses),
            "IMPORTS" => Some(Self::Imports),
            "IMPORTS_STYLE" => Some(Self::ImportsStyle),
            "EXPORTS" => Some(Self::Exports),
            "INHERITS" => Some(Self::Inherits),
            "EXTENDS" => Some(Self::Extends),
            "IMPLEMENTS" => Some(Self::Implements),
            "DECORATES" => Some(Self::Decorates),
            "USES_TEMPLATE" => Some(Self::UsesTemplate),
            "USES_STYLES" => Some(Self::UsesStyles),
            "USES_COMPONENT" => Some(Self::UsesComponent),
            _ => None,
        }
    }

    pub fn is_containment(&self) -> bool {
        matches!(self, Self::Contains(..))
    }
}

impl std::fmt::Display for RelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A typed node in the code graph.
///
/// `metadata` is the kind-specific attribute bag; the store adapter filters
/// it against the per-kind schema before persisting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub file_path: String,
    pub line_start: u32,
    pub line_end: u32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Entity {
    /// Read a string attribute from the metadata bag.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Insert an attribute, replacing any existing value.
    pub fn set_attr(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }
}

// ---------------------------------------------------------------------------
// Relationship
// ---------------------------------------------------------------------------

/// A typed, directed edge between two entities.
///
/// During Pass 1 the `to_id` (and for decorators the `from_id`) may be an
/// `unresolved:` placeholder; the resolver rewrites every placeholder to a
/// concrete entity ID before anything reaches the store.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub from_id: String,
    pub to_id: String,
    pub kind: RelKind,
    pub metadata: Map<String, Value>,
}

impl Relationship {
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>, kind: RelKind) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            kind,
            metadata: Map::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ParseResult
// ---------------------------------------------------------------------------

/// Per-file parser output.
///
/// A syntactically broken file still yields a File entity (so hash tracking
/// keeps working) with the error recorded; an I/O failure yields an empty
/// result with the error recorded and an empty hash.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub file_path: String,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub file_hash: String,
    pub errors: Vec<String>,
    pub parse_time: Duration,
}

impl ParseResult {
    /// An error-only result, used when a file cannot be read at all.
    pub fn failed(file_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            entities: Vec::new(),
            relationships: Vec::new(),
            file_hash: String::new(),
            errors: vec![error.into()],
            parse_time: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Identifier derivation
// ---------------------------------------------------------------------------

/// Derive the stable identifier for an entity.
///
/// The id is the hex SHA-256 of the colon-joined tuple
/// `(posix_path, kind, name, line_start[, line_end][, parent:<scope>])`.
/// The path participates so a rename changes every id in the file; the
/// optional parent scope (dotted class/function name stack) keeps nested
/// definitions with the same simple name distinct.
pub fn entity_id(
    file_path: &str,
    kind: EntityKind,
    name: &str,
    line_start: u32,
    line_end: Option<u32>,
    parent_scope: Option<&str>,
) -> String {
    let normalized = posix_path(file_path);
    let mut parts: Vec<String> = vec![
        normalized,
        kind.as_str().to_string(),
        if name.is_empty() {
            "anonymous".into()
        } else {
            name.to_string()
        },
        line_start.to_string(),
    ];
    if let Some(end) = line_end {
        if end != line_start {
            parts.push(end.to_string());
        }
    }
    if let Some(parent) = parent_scope {
        if !parent.is_empty() {
            parts.push(format!("parent:{parent}"));
        }
    }
    sha256_hex(&parts.join(":"))
}

/// Derive the stable identifier for an external stub.
///
/// Salted with the reference type so a function stub and a property stub
/// sharing a surface name get distinct ids.
pub fn external_stub_id(ref_type: &str, name: &str) -> String {
    sha256_hex(&format!("external:{ref_type}:{name}"))
}

/// Normalize a path to forward slashes.
pub fn posix_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Lexically join `dir` and `rel`, resolving `.` and `..` components.
///
/// `join_normalized("src/app/x", "../shared/a.html")` → `src/app/shared/a.html`.
/// Purely textual; never touches the filesystem.
pub fn join_normalized(dir: &str, rel: &str) -> String {
    let joined = if dir.is_empty() {
        posix_path(rel)
    } else {
        format!("{}/{}", posix_path(dir), posix_path(rel))
    };
    let absolute = joined.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    let normalized = parts.join("/");
    if absolute {
        format!("/{normalized}")
    } else {
        normalized
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Unresolved references
// ---------------------------------------------------------------------------

/// Placeholder prefix parsers use for cross-file edge endpoints.
pub const UNRESOLVED_PREFIX: &str = "unresolved:";

/// Tag of an unresolved reference, encoded as `unresolved:<tag>_<raw>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefTag {
    Function,
    Property,
    Module,
    Template,
    Style,
    External,
    Export,
    InlineTemplate,
    InlineStyles,
    AngularComponent,
}

impl RefTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Property => "property",
            Self::Module => "module",
            Self::Template => "template",
            Self::Style => "style",
            Self::External => "external",
            Self::Export => "export",
            Self::InlineTemplate => "inline_template",
            Self::InlineStyles => "inline_styles",
            Self::AngularComponent => "angular_component",
        }
    }

    /// Tags ordered longest-first so prefix parsing is unambiguous
    /// (`inline_template_` must win before a bare `template_` attempt).
    pub const PARSE_ORDER: [RefTag; 10] = [
        RefTag::AngularComponent,
        RefTag::InlineTemplate,
        RefTag::InlineStyles,
        RefTag::Function,
        RefTag::Property,
        RefTag::Template,
        RefTag::External,
        RefTag::Module,
        RefTag::Export,
        RefTag::Style,
    ];
}

/// Encode an unresolved reference endpoint.
pub fn unresolved(tag: RefTag, raw: &str) -> String {
    format!("{UNRESOLVED_PREFIX}{}_{raw}", tag.as_str())
}

/// Whether an edge endpoint is still an unresolved placeholder.
pub fn is_unresolved(id: &str) -> bool {
    id.starts_with(UNRESOLVED_PREFIX)
}

/// Decode an unresolved placeholder into its tag and raw reference text.
pub fn parse_unresolved(id: &str) -> Option<(RefTag, &str)> {
    let rest = id.strip_prefix(UNRESOLVED_PREFIX)?;
    for tag in RefTag::PARSE_ORDER {
        if let Some(raw) = rest.strip_prefix(tag.as_str()) {
            if let Some(raw) = raw.strip_prefix('_') {
                return Some((tag, raw));
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // -- EntityKind ---------------------------------------------------------

    #[test]
    fn entity_kind_roundtrips() {
        for kind in ALL_ENTITY_KINDS {
            assert_eq!(EntityKind::from_str_loose(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn external_kinds_flagged() {
        assert!(EntityKind::ExternalModule.is_external());
        assert!(EntityKind::ExternalTemplate.is_external());
        assert!(!EntityKind::Class.is_external());
        assert!(!EntityKind::AngularComponent.is_external());
    }

    #[test]
    fn entity_kind_serde_uses_canonical_names() {
        let json = serde_json::to_string(&EntityKind::AngularComponent).unwrap();
        assert_eq!(json, "\"AngularComponent\"");
        let json = serde_json::to_string(&EntityKind::TypeAlias).unwrap();
        assert_eq!(json, "\"TypeAlias\"");
    }

    // -- RelKind ------------------------------------------------------------

    #[test_case(RelKind::Contains(ScopeKind::File, EntityKind::Class), "FILE_CONTAINS_CLASS" ; "file_contains_class")]
    #[test_case(RelKind::Contains(ScopeKind::Module, EntityKind::Function), "MODULE_CONTAINS_FUNCTION" ; "module_contains_function")]
    #[test_case(RelKind::Contains(ScopeKind::Class, EntityKind::Method), "CLASS_CONTAINS_METHOD" ; "class_contains_method")]
    #[test_case(RelKind::Contains(ScopeKind::Function, EntityKind::Variable), "FUNCTION_CONTAINS_VARIABLE" ; "function_contains_variable")]
    #[test_case(RelKind::Contains(ScopeKind::File, EntityKind::AngularComponent), "FILE_CONTAINS_ANGULARCOMPONENT" ; "file_contains_component")]
    #[test_case(RelKind::Calls, "CALLS" ; "calls")]
    #[test_case(RelKind::UsesTemplate, "USES_TEMPLATE" ; "uses_template")]
    #[test_case(RelKind::ImportsStyle, "IMPORTS_STYLE" ; "imports_style")]
    fn rel_kind_names(kind: RelKind, expected: &str) {
        assert_eq!(kind.name(), expected);
        assert_eq!(RelKind::parse(expected), Some(kind));
    }

    #[test]
    fn rel_kind_parse_rejects_unknown() {
        assert_eq!(RelKind::parse("FILE_CONTAINS_WIDGET"), None);
        assert_eq!(RelKind::parse("FRIENDS_WITH"), None);
        assert_eq!(RelKind::parse(""), None);
    }

    // -- entity_id ----------------------------------------------------------

    #[test]
    fn entity_id_is_deterministic() {
        let a = entity_id(
            "src/app.py",
            EntityKind::Function,
            "run",
            10,
            Some(20),
            Some("App"),
        );
        let b = entity_id(
            "src/app.py",
            EntityKind::Function,
            "run",
            10,
            Some(20),
            Some("App"),
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn entity_id_distinguishes_siblings() {
        let by_line = entity_id("a.py", EntityKind::Function, "f", 1, None, None);
        let other_line = entity_id("a.py", EntityKind::Function, "f", 2, None, None);
        assert_ne!(by_line, other_line);

        let in_class = entity_id("a.py", EntityKind::Function, "f", 1, None, Some("A"));
        let in_other = entity_id("a.py", EntityKind::Function, "f", 1, None, Some("B"));
        assert_ne!(in_class, in_other);
        assert_ne!(by_line, in_class);
    }

    #[test]
    fn entity_id_changes_with_path() {
        let a = entity_id("src/a.py", EntityKind::Class, "C", 1, None, None);
        let b = entity_id("src/b.py", EntityKind::Class, "C", 1, None, None);
        assert_ne!(a, b);
    }

    #[test]
    fn entity_id_normalizes_separators() {
        let unix = entity_id("src/app/x.ts", EntityKind::File, "x.ts", 1, None, None);
        let windows = entity_id("src\\app\\x.ts", EntityKind::File, "x.ts", 1, None, None);
        assert_eq!(unix, windows);
    }

    #[test]
    fn equal_line_end_is_ignored() {
        // Single-line entities hash identically whether or not the end line
        // is supplied, matching the id derivation tuple.
        let with_end = entity_id("a.py", EntityKind::Variable, "x", 3, Some(3), None);
        let without = entity_id("a.py", EntityKind::Variable, "x", 3, None, None);
        assert_eq!(with_end, without);
    }

    #[test]
    fn join_normalized_resolves_components() {
        assert_eq!(
            join_normalized("src/app/x", "./x.html"),
            "src/app/x/x.html"
        );
        assert_eq!(
            join_normalized("src/app/x", "../shared/a.scss"),
            "src/app/shared/a.scss"
        );
        assert_eq!(join_normalized("", "a/./b/../c"), "a/c");
        assert_eq!(
            join_normalized("/proj/src", "./t.html"),
            "/proj/src/t.html"
        );
    }

    #[test]
    fn stub_id_salted_by_ref_type() {
        let f = external_stub_id("ExternalFunction", "subscribe");
        let p = external_stub_id("ExternalProperty", "subscribe");
        assert_ne!(f, p);
        assert_eq!(f, external_stub_id("ExternalFunction", "subscribe"));
    }

    // -- unresolved references ---------------------------------------------

    #[test_case(RefTag::Function, "foo", "unresolved:function_foo" ; "function")]
    #[test_case(RefTag::Module, "./x", "unresolved:module_./x" ; "module")]
    #[test_case(RefTag::Template, "./a.component.html", "unresolved:template_./a.component.html" ; "template")]
    #[test_case(RefTag::InlineStyles, "abc123", "unresolved:inline_styles_abc123" ; "inline_styles")]
    #[test_case(RefTag::AngularComponent, "app-nav", "unresolved:angular_component_app-nav" ; "angular_component")]
    fn unresolved_encoding(tag: RefTag, raw: &str, expected: &str) {
        let encoded = unresolved(tag, raw);
        assert_eq!(encoded, expected);
        assert!(is_unresolved(&encoded));
        assert_eq!(parse_unresolved(&encoded), Some((tag, raw)));
    }

    #[test]
    fn unresolved_raw_may_contain_underscores() {
        let encoded = unresolved(RefTag::Property, "this.user_service.http_client");
        assert_eq!(
            parse_unresolved(&encoded),
            Some((RefTag::Property, "this.user_service.http_client"))
        );
    }

    #[test]
    fn parse_unresolved_rejects_plain_ids() {
        assert_eq!(parse_unresolved("abc123"), None);
        assert_eq!(parse_unresolved("unresolved:bogus_foo"), None);
        assert!(!is_unresolved("abc123"));
    }

    // -- Entity / Relationship helpers -------------------------------------

    #[test]
    fn entity_attr_helpers() {
        let mut entity = Entity {
            id: "id".into(),
            name: "n".into(),
            kind: EntityKind::Class,
            file_path: "a.py".into(),
            line_start: 1,
            line_end: 5,
            metadata: Map::new(),
        };
        entity.set_attr("docstring", "hello");
        assert_eq!(entity.attr_str("docstring"), Some("hello"));
        assert_eq!(entity.attr_str("missing"), None);
    }

    #[test]
    fn relationship_builder() {
        let rel = Relationship::new("a", "b", RelKind::Calls)
            .with_attr("call_type", "function_call")
            .with_attr("line_number", 3);
        assert_eq!(rel.metadata.get("line_number"), Some(&Value::from(3)));
        assert_eq!(rel.kind.name(), "CALLS");
    }

    // -- property tests -----------------------------------------------------

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn entity_id_never_panics(
            path in "\\PC{1,60}",
            name in "\\PC{0,40}",
            line in 0u32..100_000u32,
        ) {
            let id = entity_id(&path, EntityKind::Function, &name, line, None, None);
            prop_assert_eq!(id.len(), 64);
        }

        #[test]
        fn parse_unresolved_never_panics(s in "\\PC{0,80}") {
            let _ = parse_unresolved(&s);
        }

        #[test]
        fn unresolved_roundtrip(raw in "[a-zA-Z0-9_./@-]{1,60}") {
            for tag in RefTag::PARSE_ORDER {
                let encoded = unresolved(tag, &raw);
                prop_assert_eq!(parse_unresolved(&encoded), Some((tag, raw.as_str())));
            }
        }
    }
}
