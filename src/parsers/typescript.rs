//! TypeScript and JavaScript parser, including Angular decorator handling.
//!
//! One CST walker serves both languages; only the grammar differs. The
//! walker keeps class/function scope stacks for id derivation and
//! containment, and projects Angular decorators (`@Component`,
//! `@Injectable`, …) into framework-typed sibling entities of the decorated
//! class, with template/style edges carrying enough metadata for the
//! resolver to compute absolute paths.

use std::path::Path;

use serde_json::{Map, Value};
use tree_sitter::Node;

use crate::parsers::parser::{anonymous_name, node_lines, node_text, CstParser, Grammar};
use crate::parsers::{file_entity, read_source, ParserOptions};
use crate::types::{
    entity_id, join_normalized, posix_path, unresolved, Entity, EntityKind, FileKind, ParseResult,
    RefTag, RelKind, Relationship, ScopeKind,
};

/// The fixed Angular decorator map.
const ANGULAR_DECORATORS: &[(&str, EntityKind)] = &[
    ("Component", EntityKind::AngularComponent),
    ("Injectable", EntityKind::AngularService),
    ("Directive", EntityKind::AngularDirective),
    ("Pipe", EntityKind::AngularPipe),
    ("NgModule", EntityKind::AngularModule),
    ("Input", EntityKind::AngularInput),
    ("Output", EntityKind::AngularOutput),
];

fn angular_kind(decorator: &str) -> Option<EntityKind> {
    ANGULAR_DECORATORS
        .iter()
        .find(|(name, _)| *name == decorator)
        .map(|(_, kind)| *kind)
}

/// Parse a TypeScript, Angular-tagged, or JavaScript file.
pub fn parse(path: &Path, kind: FileKind, _options: &ParserOptions) -> ParseResult {
    let file_path = path.to_string_lossy().into_owned();
    let (source, hash) = match read_source(path) {
        Ok(pair) => pair,
        Err(e) => return ParseResult::failed(file_path, format!("failed to read file: {e}")),
    };

    let grammar = Grammar::for_kind(kind).unwrap_or(Grammar::TypeScript);

    let file = file_entity(path, kind, &source, &hash);

    let tree = match CstParser::new().parse(&source, grammar) {
        Ok(tree) => tree,
        Err(e) => {
            return ParseResult {
                file_path,
                entities: vec![file],
                relationships: Vec::new(),
                file_hash: hash,
                errors: vec![e.to_string()],
                parse_time: std::time::Duration::ZERO,
            }
        }
    };

    if tree.root_node().has_error() {
        let error = format!("syntax error in {file_path}");
        return ParseResult {
            file_path,
            entities: vec![file],
            relationships: Vec::new(),
            file_hash: hash,
            errors: vec![error],
            parse_time: std::time::Duration::ZERO,
        };
    }

    let mut walker = TsWalker::new(&file_path, &source, &file);
    walker.walk_children(tree.root_node());

    let mut entities = vec![file];
    entities.extend(walker.entities);
    let relationships = walker.relationships;

    ParseResult {
        file_path,
        entities,
        relationships,
        file_hash: hash,
        errors: Vec::new(),
        parse_time: std::time::Duration::ZERO,
    }
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

struct TsWalker<'a> {
    source: &'a str,
    file_path: &'a str,
    file_id: String,
    file_name: String,
    scope_names: Vec<String>,
    class_stack: Vec<String>,
    function_stack: Vec<String>,
    /// Set by `export` statements for the declaration they wrap.
    pending_export: bool,
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
}

impl<'a> TsWalker<'a> {
    fn new(file_path: &'a str, source: &'a str, file: &Entity) -> Self {
        Self {
            source,
            file_path,
            file_id: file.id.clone(),
            file_name: file.name.clone(),
            scope_names: Vec::new(),
            class_stack: Vec::new(),
            function_stack: Vec::new(),
            pending_export: false,
            entities: Vec::new(),
            relationships: Vec::new(),
        }
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        node_text(node, self.source)
    }

    fn scope(&self) -> Option<String> {
        if self.scope_names.is_empty() {
            None
        } else {
            Some(self.scope_names.join("."))
        }
    }

    fn relate(&mut self, from: &str, to: &str, kind: RelKind) {
        self.relationships.push(Relationship::new(from, to, kind));
    }

    /// Scope-chain containment edge plus the direct file edge every entity
    /// carries. When the immediate scope is the file itself only the file
    /// edge is emitted.
    fn emit_containment(&mut self, child_kind: EntityKind, child_id: &str) {
        if let Some(class_id) = self.class_stack.last().cloned() {
            self.relate(
                &class_id,
                child_id,
                RelKind::Contains(ScopeKind::Class, child_kind),
            );
        } else if let Some(function_id) = self.function_stack.last().cloned() {
            self.relate(
                &function_id,
                child_id,
                RelKind::Contains(ScopeKind::Function, child_kind),
            );
        }
        let file_id = self.file_id.clone();
        self.relate(
            &file_id,
            child_id,
            RelKind::Contains(ScopeKind::File, child_kind),
        );
    }

    fn take_export(&mut self) -> bool {
        std::mem::take(&mut self.pending_export)
    }

    // -- traversal ----------------------------------------------------------

    fn walk_children(&mut self, node: Node<'_>) {
        for child in named_children(node) {
            self.walk(child);
        }
    }

    fn walk(&mut self, node: Node<'_>) {
        match node.kind() {
            "import_statement" => self.visit_import(node),
            "export_statement" => self.visit_export(node),
            "class_declaration" | "abstract_class_declaration" => self.visit_class(node, &[]),
            "function_declaration" | "generator_function_declaration" => self.visit_function(node),
            "lexical_declaration" | "variable_declaration" => self.visit_variable_decl(node),
            "interface_declaration" => self.visit_interface(node),
            "type_alias_declaration" => self.visit_type_alias(node),
            "enum_declaration" => self.visit_enum(node),
            "arrow_function" | "function_expression" => self.visit_anonymous_function(node),
            "call_expression" => {
                self.visit_call(node);
                self.walk_children(node);
            }
            "member_expression" => {
                self.visit_member(node);
                self.walk_children(node);
            }
            _ => self.walk_children(node),
        }
    }

    // -- imports ------------------------------------------------------------

    fn visit_import(&mut self, node: Node<'_>) {
        let Some(module_path) = node
            .child_by_field_name("source")
            .map(|s| strip_quotes(self.text(s)))
        else {
            return;
        };
        let (line, _) = node_lines(node);

        let mut default_name: Option<String> = None;
        let mut namespace_alias: Option<String> = None;
        let mut named: Vec<String> = Vec::new();

        for clause in named_children(node) {
            if clause.kind() != "import_clause" {
                continue;
            }
            for part in named_children(clause) {
                match part.kind() {
                    "identifier" => default_name = Some(self.text(part).to_string()),
                    "namespace_import" => {
                        namespace_alias = named_children(part)
                            .into_iter()
                            .find(|n| n.kind() == "identifier")
                            .map(|n| self.text(n).to_string());
                    }
                    "named_imports" => {
                        for spec in named_children(part) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            let name = spec
                                .child_by_field_name("alias")
                                .or_else(|| spec.child_by_field_name("name"))
                                .map(|n| self.text(n).to_string());
                            if let Some(name) = name {
                                named.push(name);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let import_type = if default_name.is_some() {
            "default"
        } else if namespace_alias.is_some() {
            "namespace"
        } else if !named.is_empty() {
            "named"
        } else {
            "side_effect"
        };

        let display = default_name
            .clone()
            .or_else(|| namespace_alias.clone())
            .or_else(|| named.first().cloned())
            .unwrap_or_else(|| module_path.clone());

        let import_id = entity_id(
            self.file_path,
            EntityKind::Import,
            &format!("{module_path}:{display}"),
            line,
            None,
            None,
        );
        let mut entity = Entity {
            id: import_id.clone(),
            name: display,
            kind: EntityKind::Import,
            file_path: self.file_path.to_string(),
            line_start: line,
            line_end: line,
            metadata: Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        entity.set_attr("module_name", module_path.clone());
        entity.set_attr("import_type", import_type);
        entity.set_attr("is_relative", module_path.starts_with('.'));
        if let Some(alias) = namespace_alias {
            entity.set_attr("alias", alias);
        }
        if !named.is_empty() {
            entity.set_attr("symbols", named.join(","));
        }
        self.entities.push(entity);

        let file_id = self.file_id.clone();
        self.relate(
            &file_id,
            &import_id,
            RelKind::Contains(ScopeKind::File, EntityKind::Import),
        );
        self.relationships.push(
            Relationship::new(
                file_id.clone(),
                unresolved(RefTag::Module, &module_path),
                RelKind::Imports,
            )
            .with_attr("import_type", import_type),
        );
        for name in named {
            self.relationships.push(
                Relationship::new(
                    file_id.clone(),
                    unresolved(RefTag::External, &name),
                    RelKind::Uses,
                )
                .with_attr("usage_type", "named_import")
                .with_attr("line_number", line),
            );
        }
    }

    // -- exports ------------------------------------------------------------

    fn visit_export(&mut self, node: Node<'_>) {
        let (line, _) = node_lines(node);
        let decorators: Vec<Node<'_>> = named_children(node)
            .into_iter()
            .filter(|n| n.kind() == "decorator")
            .collect();
        let is_default = has_token(node, "default");

        if let Some(declaration) = node.child_by_field_name("declaration") {
            self.pending_export = true;
            match declaration.kind() {
                "class_declaration" | "abstract_class_declaration" => {
                    self.visit_class(declaration, &decorators)
                }
                _ => self.walk(declaration),
            }
            self.pending_export = false;

            if let Some(name) = self.declared_name(declaration) {
                self.emit_export_edge(&name, if is_default { "default_export" } else { "named_export" }, line);
            }
            return;
        }

        // `export default <expr>` / `export { a, b }` / `export * from '...'`
        let mut symbols: Vec<String> = Vec::new();
        for child in named_children(node) {
            if child.kind() == "export_clause" {
                for spec in named_children(child) {
                    if spec.kind() != "export_specifier" {
                        continue;
                    }
                    let name = spec
                        .child_by_field_name("alias")
                        .or_else(|| spec.child_by_field_name("name"))
                        .map(|n| self.text(n).to_string());
                    if let Some(name) = name {
                        symbols.push(name);
                    }
                }
            }
        }

        if is_default {
            let symbol = format!("default_{}", self.file_name);
            self.emit_export_entity("default", line, "default_export", true);
            let file_id = self.file_id.clone();
            self.relationships.push(
                Relationship::new(
                    file_id,
                    unresolved(RefTag::Export, &symbol),
                    RelKind::Exports,
                )
                .with_attr("export_type", "default_export")
                .with_attr("symbol", symbol),
            );
        } else {
            for symbol in symbols {
                self.emit_export_entity(&symbol, line, "named_export", false);
                self.emit_export_edge(&symbol, "named_export", line);
            }
        }
    }

    fn emit_export_edge(&mut self, symbol: &str, export_type: &str, _line: u32) {
        let file_id = self.file_id.clone();
        self.relationships.push(
            Relationship::new(
                file_id,
                unresolved(RefTag::Export, symbol),
                RelKind::Exports,
            )
            .with_attr("export_type", export_type)
            .with_attr("symbol", symbol),
        );
    }

    fn emit_export_entity(
        &mut self,
        name: &str,
        line: u32,
        export_type: &str,
        is_default: bool,
    ) -> String {
        let export_id = entity_id(
            self.file_path,
            EntityKind::Export,
            name,
            line,
            None,
            None,
        );
        let mut entity = Entity {
            id: export_id.clone(),
            name: name.to_string(),
            kind: EntityKind::Export,
            file_path: self.file_path.to_string(),
            line_start: line,
            line_end: line,
            metadata: Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        entity.set_attr("export_type", export_type);
        entity.set_attr("is_default", is_default);
        self.entities.push(entity);

        let file_id = self.file_id.clone();
        self.relate(
            &file_id,
            &export_id,
            RelKind::Contains(ScopeKind::File, EntityKind::Export),
        );
        export_id
    }

    fn declared_name(&self, declaration: Node<'_>) -> Option<String> {
        if let Some(name) = declaration.child_by_field_name("name") {
            return Some(self.text(name).to_string());
        }
        // Variable declarations name their first declarator.
        named_children(declaration)
            .into_iter()
            .find(|n| n.kind() == "variable_declarator")
            .and_then(|d| d.child_by_field_name("name"))
            .map(|n| self.text(n).to_string())
    }

    // -- classes ------------------------------------------------------------

    fn visit_class(&mut self, node: Node<'_>, extra_decorators: &[Node<'_>]) {
        let exported = self.take_export();
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let (line_start, line_end) = node_lines(node);
        let class_id = entity_id(
            self.file_path,
            EntityKind::Class,
            &name,
            line_start,
            Some(line_end),
            self.scope().as_deref(),
        );

        let mut decorators: Vec<Node<'_>> = extra_decorators.to_vec();
        decorators.extend(
            named_children(node)
                .into_iter()
                .filter(|n| n.kind() == "decorator"),
        );

        let (extends, implements) = self.heritage_of(node);
        let (method_count, property_count) = self.class_member_counts(node);

        let mut entity = Entity {
            id: class_id.clone(),
            name: name.clone(),
            kind: EntityKind::Class,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            metadata: Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        if let Some(base) = extends.first() {
            entity.set_attr("extends", base.clone());
        }
        entity.set_attr("method_count", method_count);
        entity.set_attr("property_count", property_count);
        entity.set_attr(
            "is_abstract",
            node.kind() == "abstract_class_declaration",
        );
        entity.set_attr("exported", exported);
        self.entities.push(entity);

        self.emit_containment(EntityKind::Class, &class_id);

        for base in &extends {
            let target = unresolved(RefTag::External, base);
            self.relate(&class_id, &target, RelKind::Extends);
        }
        for interface in &implements {
            let target = unresolved(RefTag::External, interface);
            self.relate(&class_id, &target, RelKind::Implements);
        }

        for decorator in &decorators {
            self.visit_class_decorator(*decorator, &name, &class_id);
        }

        self.scope_names.push(name);
        self.class_stack.push(class_id);
        if let Some(body) = node.child_by_field_name("body") {
            for member in named_children(body) {
                match member.kind() {
                    "method_definition" => self.visit_method(member),
                    "public_field_definition" | "field_definition" => self.visit_field(member),
                    _ => self.walk(member),
                }
            }
        }
        self.class_stack.pop();
        self.scope_names.pop();
    }

    fn heritage_of(&self, node: Node<'_>) -> (Vec<String>, Vec<String>) {
        let mut extends = Vec::new();
        let mut implements = Vec::new();
        for child in named_children(node) {
            if child.kind() != "class_heritage" {
                continue;
            }
            for clause in named_children(child) {
                match clause.kind() {
                    "extends_clause" => {
                        for value in named_children(clause) {
                            if let Some(name) = dotted_name(value, self.source) {
                                extends.push(name);
                            }
                        }
                    }
                    "implements_clause" => {
                        for ty in named_children(clause) {
                            let text = self.text(ty);
                            let name = text.split('<').next().unwrap_or(text).trim();
                            if !name.is_empty() {
                                implements.push(name.to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        (extends, implements)
    }

    fn class_member_counts(&self, node: Node<'_>) -> (u64, u64) {
        let mut methods = 0;
        let mut properties = 0;
        if let Some(body) = node.child_by_field_name("body") {
            for member in named_children(body) {
                match member.kind() {
                    "method_definition" => methods += 1,
                    "public_field_definition" | "field_definition" => properties += 1,
                    _ => {}
                }
            }
        }
        (methods, properties)
    }

    // -- methods ------------------------------------------------------------

    fn visit_method(&mut self, node: Node<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let (line_start, line_end) = node_lines(node);

        let kind = if name == "constructor" {
            EntityKind::Constructor
        } else if has_token(node, "get") {
            EntityKind::Getter
        } else if has_token(node, "set") {
            EntityKind::Setter
        } else {
            EntityKind::Method
        };

        let method_id = entity_id(
            self.file_path,
            kind,
            &name,
            line_start,
            Some(line_end),
            self.scope().as_deref(),
        );

        let mut entity = Entity {
            id: method_id.clone(),
            name: name.clone(),
            kind,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            metadata: Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        if let Some(class_id) = self.class_stack.last() {
            entity.set_attr("class_id", class_id.clone());
        }
        if let Some(accessibility) = self.accessibility_of(node) {
            entity.set_attr("accessibility", accessibility);
        }
        entity.set_attr("is_static", has_token(node, "static"));
        entity.set_attr("is_async", has_token(node, "async"));
        if let Some(params) = node.child_by_field_name("parameters") {
            entity.set_attr("signature", self.text(params));
            entity.set_attr("parameter_count", named_children(params).len() as u64);
        }
        if let Some(ret) = node.child_by_field_name("return_type") {
            entity.set_attr("return_type", self.text(ret).trim_start_matches(':').trim());
        }
        entity.set_attr("complexity", cyclomatic_complexity(node));
        self.entities.push(entity);

        self.emit_containment(kind, &method_id);

        // Plain (non-Angular) decorators on methods.
        for decorator in named_children(node)
            .into_iter()
            .filter(|n| n.kind() == "decorator")
        {
            if let Some(dec_name) = decorator_name(decorator, self.source) {
                if angular_kind(&dec_name).is_none() {
                    self.emit_plain_decorator(decorator, &dec_name, &method_id);
                }
            }
        }

        self.scope_names.push(name);
        self.function_stack.push(method_id);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_children(body);
        }
        self.function_stack.pop();
        self.scope_names.pop();
    }

    fn accessibility_of(&self, node: Node<'_>) -> Option<String> {
        let mut cursor = node.walk();
        let result = node
            .children(&mut cursor)
            .find(|c| c.kind() == "accessibility_modifier")
            .map(|c| node_text(c, self.source).to_string());
        result
    }

    // -- fields (class properties) ------------------------------------------

    fn visit_field(&mut self, node: Node<'_>) {
        let decorators: Vec<Node<'_>> = named_children(node)
            .into_iter()
            .filter(|n| n.kind() == "decorator")
            .collect();
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let field_name = self.text(name_node).to_string();
        let (line, _) = node_lines(node);

        for decorator in decorators {
            let Some(dec_name) = decorator_name(decorator, self.source) else {
                continue;
            };
            match angular_kind(&dec_name) {
                Some(kind @ (EntityKind::AngularInput | EntityKind::AngularOutput)) => {
                    let config = self.decorator_config(decorator);
                    let binding_name = config
                        .get("raw_argument")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| field_name.clone());

                    let ng_id = entity_id(
                        self.file_path,
                        kind,
                        &field_name,
                        line,
                        None,
                        self.scope().as_deref(),
                    );
                    let mut entity = Entity {
                        id: ng_id.clone(),
                        name: field_name.clone(),
                        kind,
                        file_path: self.file_path.to_string(),
                        line_start: line,
                        line_end: line,
                        metadata: Map::new(),
                    };
                    entity.set_attr("file_id", self.file_id.clone());
                    entity.set_attr("decorator_name", dec_name.clone());
                    entity.set_attr("framework", "angular");
                    if kind == EntityKind::AngularInput {
                        entity.set_attr("input_name", binding_name);
                    } else {
                        entity.set_attr("output_name", binding_name);
                        if let Some(ty) = node.child_by_field_name("type") {
                            entity.set_attr(
                                "event_type",
                                self.text(ty).trim_start_matches(':').trim(),
                            );
                        }
                    }
                    self.entities.push(entity);
                    let file_id = self.file_id.clone();
                    self.relate(
                        &file_id,
                        &ng_id,
                        RelKind::Contains(ScopeKind::File, kind),
                    );
                }
                _ => {}
            }
        }

        // Field initializers may contain calls and accesses.
        if let Some(value) = node.child_by_field_name("value") {
            self.walk(value);
        }
    }

    // -- functions ----------------------------------------------------------

    fn visit_function(&mut self, node: Node<'_>) {
        let exported = self.take_export();
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let (line_start, line_end) = node_lines(node);
        let function_id = entity_id(
            self.file_path,
            EntityKind::Function,
            &name,
            line_start,
            Some(line_end),
            self.scope().as_deref(),
        );

        let mut entity = Entity {
            id: function_id.clone(),
            name: name.clone(),
            kind: EntityKind::Function,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            metadata: Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        if let Some(params) = node.child_by_field_name("parameters") {
            entity.set_attr("signature", self.text(params));
            entity.set_attr("parameter_count", named_children(params).len() as u64);
        }
        if let Some(ret) = node.child_by_field_name("return_type") {
            entity.set_attr("return_type", self.text(ret).trim_start_matches(':').trim());
        }
        entity.set_attr("is_async", has_token(node, "async"));
        entity.set_attr(
            "is_generator",
            node.kind() == "generator_function_declaration",
        );
        entity.set_attr("complexity", cyclomatic_complexity(node));
        entity.set_attr("exported", exported);
        self.entities.push(entity);

        self.emit_containment(EntityKind::Function, &function_id);

        self.scope_names.push(name);
        self.function_stack.push(function_id);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_children(body);
        }
        self.function_stack.pop();
        self.scope_names.pop();
    }

    /// Assigned arrow functions and function expressions get a synthesized
    /// stable name (`arrow_function_L10_12`) since they carry no identifier.
    fn visit_anonymous_function(&mut self, node: Node<'_>) {
        let (line_start, line_end) = node_lines(node);
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_else(|| anonymous_name(node.kind(), line_start, line_end));

        let function_id = entity_id(
            self.file_path,
            EntityKind::Function,
            &name,
            line_start,
            Some(line_end),
            self.scope().as_deref(),
        );

        let mut entity = Entity {
            id: function_id.clone(),
            name: name.clone(),
            kind: EntityKind::Function,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            metadata: Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        entity.set_attr("is_async", has_token(node, "async"));
        entity.set_attr("is_arrow", node.kind() == "arrow_function");
        if let Some(params) = node.child_by_field_name("parameters") {
            entity.set_attr("signature", self.text(params));
            entity.set_attr("parameter_count", named_children(params).len() as u64);
        }
        entity.set_attr("complexity", cyclomatic_complexity(node));
        self.entities.push(entity);

        self.emit_containment(EntityKind::Function, &function_id);

        self.scope_names.push(name);
        self.function_stack.push(function_id);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body);
        }
        self.function_stack.pop();
        self.scope_names.pop();
    }

    // -- variables ----------------------------------------------------------

    fn visit_variable_decl(&mut self, node: Node<'_>) {
        let exported = self.take_export();
        let is_const = has_token(node, "const");
        for declarator in named_children(node)
            .into_iter()
            .filter(|n| n.kind() == "variable_declarator")
        {
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            if name_node.kind() != "identifier" {
                continue; // destructuring patterns carry no single name
            }
            let name = self.text(name_node).to_string();
            let (line, _) = node_lines(declarator);

            let value = declarator.child_by_field_name("value");
            let type_annotation = declarator
                .child_by_field_name("type")
                .map(|t| self.text(t).trim_start_matches(':').trim().to_string())
                .or_else(|| value.map(|v| infer_type(v)))
                .unwrap_or_else(|| "unknown".into());

            let var_id = entity_id(
                self.file_path,
                EntityKind::Variable,
                &name,
                line,
                None,
                self.scope().as_deref(),
            );
            let mut entity = Entity {
                id: var_id.clone(),
                name: name.clone(),
                kind: EntityKind::Variable,
                file_path: self.file_path.to_string(),
                line_start: line,
                line_end: line,
                metadata: Map::new(),
            };
            entity.set_attr("file_id", self.file_id.clone());
            entity.set_attr("type_annotation", type_annotation);
            entity.set_attr(
                "is_global",
                self.function_stack.is_empty() && self.class_stack.is_empty(),
            );
            entity.set_attr(
                "is_constant",
                is_const && name.chars().all(|c| !c.is_lowercase()),
            );
            let scope_id = self
                .function_stack
                .last()
                .or(self.class_stack.last())
                .cloned()
                .unwrap_or_else(|| self.file_id.clone());
            entity.set_attr("scope_id", scope_id);
            entity.set_attr("exported", exported);
            self.entities.push(entity);

            self.emit_containment(EntityKind::Variable, &var_id);

            // The initializer may hold arrow functions, calls, accesses.
            if let Some(value) = value {
                self.walk(value);
            }
        }
    }

    // -- type aliases / enums / interfaces ----------------------------------

    fn visit_interface(&mut self, node: Node<'_>) {
        let exported = self.take_export();
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let (line_start, line_end) = node_lines(node);
        let interface_id = entity_id(
            self.file_path,
            EntityKind::Interface,
            &name,
            line_start,
            Some(line_end),
            self.scope().as_deref(),
        );

        let mut property_count = 0u64;
        let mut method_count = 0u64;
        if let Some(body) = node.child_by_field_name("body") {
            for member in named_children(body) {
                match member.kind() {
                    "property_signature" => property_count += 1,
                    "method_signature" => method_count += 1,
                    _ => {}
                }
            }
        }

        let mut entity = Entity {
            id: interface_id.clone(),
            name,
            kind: EntityKind::Interface,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            metadata: Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        entity.set_attr("property_count", property_count);
        entity.set_attr("method_count", method_count);
        entity.set_attr("exported", exported);
        self.entities.push(entity);

        self.emit_containment(EntityKind::Interface, &interface_id);
    }

    fn visit_type_alias(&mut self, node: Node<'_>) {
        let exported = self.take_export();
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let (line_start, line_end) = node_lines(node);
        let alias_id = entity_id(
            self.file_path,
            EntityKind::TypeAlias,
            &name,
            line_start,
            Some(line_end),
            self.scope().as_deref(),
        );

        let mut entity = Entity {
            id: alias_id.clone(),
            name,
            kind: EntityKind::TypeAlias,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            metadata: Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        if let Some(value) = node.child_by_field_name("value") {
            entity.set_attr(
                "type_definition",
                self.text(value).chars().take(200).collect::<String>(),
            );
        }
        entity.set_attr("exported", exported);
        self.entities.push(entity);

        self.emit_containment(EntityKind::TypeAlias, &alias_id);
    }

    fn visit_enum(&mut self, node: Node<'_>) {
        let exported = self.take_export();
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let (line_start, line_end) = node_lines(node);
        let enum_id = entity_id(
            self.file_path,
            EntityKind::Enum,
            &name,
            line_start,
            Some(line_end),
            self.scope().as_deref(),
        );

        let values: Vec<String> = node
            .child_by_field_name("body")
            .map(|body| {
                named_children(body)
                    .into_iter()
                    .filter_map(|member| match member.kind() {
                        "property_identifier" => Some(self.text(member).to_string()),
                        "enum_assignment" => member
                            .child_by_field_name("name")
                            .map(|n| self.text(n).to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut entity = Entity {
            id: enum_id.clone(),
            name,
            kind: EntityKind::Enum,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            metadata: Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        entity.set_attr("values", values.join(","));
        entity.set_attr("exported", exported);
        self.entities.push(entity);

        self.emit_containment(EntityKind::Enum, &enum_id);
    }

    // -- calls / accesses ---------------------------------------------------

    fn visit_call(&mut self, node: Node<'_>) {
        let Some(caller) = self.function_stack.last().cloned() else {
            return;
        };
        let Some(callee) = node
            .child_by_field_name("function")
            .and_then(|f| dotted_name(f, self.source))
        else {
            return;
        };
        let (line, _) = node_lines(node);
        let call_type = if callee.contains('.') {
            "method_call"
        } else {
            "function_call"
        };
        self.relationships.push(
            Relationship::new(
                caller,
                unresolved(RefTag::Function, &callee),
                RelKind::Calls,
            )
            .with_attr("call_type", call_type)
            .with_attr("line_number", line),
        );
    }

    fn visit_member(&mut self, node: Node<'_>) {
        // Only the outermost expression of a chain becomes an edge; the
        // nested member_expressions are just its prefixes.
        if node
            .parent()
            .map(|p| p.kind() == "member_expression")
            .unwrap_or(false)
        {
            return;
        }
        let Some(accessor) = self.function_stack.last().cloned() else {
            return;
        };
        let Some(path) = dotted_name(node, self.source) else {
            return;
        };
        let (line, _) = node_lines(node);
        self.relationships.push(
            Relationship::new(
                accessor,
                unresolved(RefTag::Property, &path),
                RelKind::Accesses,
            )
            .with_attr("property_path", path.clone())
            .with_attr("access_location", line),
        );
    }

    // -- decorators ---------------------------------------------------------

    fn emit_plain_decorator(&mut self, decorator: Node<'_>, name: &str, target_id: &str) {
        let (line_start, line_end) = node_lines(decorator);
        let decorator_id = entity_id(
            self.file_path,
            EntityKind::Decorator,
            name,
            line_start,
            Some(line_end),
            self.scope().as_deref(),
        );
        let mut entity = Entity {
            id: decorator_id.clone(),
            name: name.to_string(),
            kind: EntityKind::Decorator,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            metadata: Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        entity.set_attr("decorator_name", name);
        let snippet: String = self.text(decorator).chars().take(200).collect();
        entity.set_attr("arguments", snippet);
        self.entities.push(entity);

        let file_id = self.file_id.clone();
        self.relate(
            &file_id,
            &decorator_id,
            RelKind::Contains(ScopeKind::File, EntityKind::Decorator),
        );
        self.relationships.push(
            Relationship::new(decorator_id, target_id, RelKind::Decorates)
                .with_attr("decorator_name", name),
        );
    }

    fn visit_class_decorator(&mut self, decorator: Node<'_>, class_name: &str, class_id: &str) {
        let Some(dec_name) = decorator_name(decorator, self.source) else {
            return;
        };
        let Some(kind) = angular_kind(&dec_name) else {
            self.emit_plain_decorator(decorator, &dec_name, class_id);
            return;
        };
        // Input/Output only make sense on fields.
        if matches!(kind, EntityKind::AngularInput | EntityKind::AngularOutput) {
            return;
        }

        let (line_start, line_end) = node_lines(decorator);
        let config = self.decorator_config(decorator);

        // Components are named by selector when one is present; everything
        // else takes the decorated class's name.
        let entity_name = if kind == EntityKind::AngularComponent {
            config
                .get("selector")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| class_name.to_string())
        } else {
            class_name.to_string()
        };

        let ng_id = entity_id(
            self.file_path,
            kind,
            &entity_name,
            line_start,
            Some(line_end),
            self.scope().as_deref(),
        );
        let mut entity = Entity {
            id: ng_id.clone(),
            name: entity_name,
            kind,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            metadata: Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        entity.set_attr("decorator_name", dec_name);
        entity.set_attr("framework", "angular");
        entity.set_attr("class_name", class_name);
        self.apply_decorator_config(&mut entity, kind, &config);
        self.entities.push(entity);

        let file_id = self.file_id.clone();
        self.relate(&file_id, &ng_id, RelKind::Contains(ScopeKind::File, kind));

        if kind == EntityKind::AngularComponent {
            self.emit_component_assets(&ng_id, &config);
        }
    }

    fn apply_decorator_config(
        &self,
        entity: &mut Entity,
        kind: EntityKind,
        config: &Map<String, Value>,
    ) {
        for (key, value) in config {
            match key.as_str() {
                "selector" => entity.set_attr("selector", value.clone()),
                "templateUrl" => entity.set_attr("template_url", value.clone()),
                "styleUrl" => entity.set_attr("style_url", value.clone()),
                "styleUrls" => entity.set_attr("style_urls", value.clone()),
                "standalone" => entity.set_attr("standalone", value.clone()),
                "providedIn" => entity.set_attr("provided_in", value.clone()),
                "imports" => entity.set_attr("imports", join_list(value)),
                "declarations" => entity.set_attr("declarations", join_list(value)),
                "exports" => entity.set_attr("exports", join_list(value)),
                "providers" => entity.set_attr("providers", join_list(value)),
                "name" if kind == EntityKind::AngularPipe => {
                    entity.set_attr("pipe_name", value.clone())
                }
                _ => {}
            }
        }
    }

    /// Emit USES_TEMPLATE / USES_STYLES edges for a `@Component` config.
    fn emit_component_assets(&mut self, component_id: &str, config: &Map<String, Value>) {
        let selector = config
            .get("selector")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let component_dir = Path::new(self.file_path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(template_path) = config.get("templateUrl").and_then(Value::as_str) {
            let resolved = join_normalized(&component_dir, template_path);
            self.relationships.push(
                Relationship::new(
                    component_id,
                    unresolved(RefTag::Template, template_path),
                    RelKind::UsesTemplate,
                )
                .with_attr("template_path", template_path)
                .with_attr("resolved_path", resolved)
                .with_attr("component_selector", selector.clone())
                .with_attr("component_file_path", posix_path(self.file_path)),
            );
        } else if config.contains_key("template") {
            self.relationships.push(
                Relationship::new(
                    component_id,
                    unresolved(RefTag::InlineTemplate, component_id),
                    RelKind::UsesTemplate,
                )
                .with_attr("template_path", "inline")
                .with_attr("resolved_path", "inline")
                .with_attr("component_selector", selector.clone()),
            );
        }

        let mut style_paths: Vec<String> = Vec::new();
        if let Some(style) = config.get("styleUrl").and_then(Value::as_str) {
            style_paths.push(style.to_string());
        }
        if let Some(styles) = config.get("styleUrls").and_then(Value::as_array) {
            style_paths.extend(
                styles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string),
            );
        }

        if !style_paths.is_empty() {
            for style_path in style_paths {
                let resolved = join_normalized(&component_dir, &style_path);
                self.relationships.push(
                    Relationship::new(
                        component_id,
                        unresolved(RefTag::Style, &style_path),
                        RelKind::UsesStyles,
                    )
                    .with_attr("style_path", style_path.clone())
                    .with_attr("resolved_path", resolved)
                    .with_attr("component_selector", selector.clone())
                    .with_attr("component_file_path", posix_path(self.file_path)),
                );
            }
        } else if config.contains_key("styles") {
            self.relationships.push(
                Relationship::new(
                    component_id,
                    unresolved(RefTag::InlineStyles, component_id),
                    RelKind::UsesStyles,
                )
                .with_attr("style_path", "inline")
                .with_attr("resolved_path", "inline")
                .with_attr("component_selector", selector),
            );
        }
    }

    /// Parse a decorator's argument object into a flat key → value map.
    /// A single non-object argument (e.g. `@Input('alias')`) lands under
    /// `raw_argument`.
    fn decorator_config(&self, decorator: Node<'_>) -> Map<String, Value> {
        let mut config = Map::new();
        let Some(call) = named_children(decorator)
            .into_iter()
            .find(|n| n.kind() == "call_expression")
        else {
            return config;
        };
        let Some(arguments) = call.child_by_field_name("arguments") else {
            return config;
        };
        for argument in named_children(arguments) {
            match argument.kind() {
                "object" => {
                    for pair in named_children(argument) {
                        if pair.kind() != "pair" {
                            continue;
                        }
                        let Some(key) = pair
                            .child_by_field_name("key")
                            .map(|k| strip_quotes(self.text(k)))
                        else {
                            continue;
                        };
                        let Some(value) = pair.child_by_field_name("value") else {
                            continue;
                        };
                        config.insert(key, self.config_value(value));
                    }
                }
                "string" => {
                    config.insert(
                        "raw_argument".into(),
                        strip_quotes(self.text(argument)).into(),
                    );
                }
                _ => {}
            }
        }
        config
    }

    fn config_value(&self, node: Node<'_>) -> Value {
        match node.kind() {
            "string" | "template_string" => strip_quotes(self.text(node)).into(),
            "true" => true.into(),
            "false" => false.into(),
            "number" => self.text(node).to_string().into(),
            "array" => Value::Array(
                named_children(node)
                    .into_iter()
                    .map(|item| match item.kind() {
                        "string" | "template_string" => strip_quotes(self.text(item)).into(),
                        _ => Value::from(self.text(item).to_string()),
                    })
                    .collect(),
            ),
            _ => self.text(node).to_string().into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Node utilities
// ---------------------------------------------------------------------------

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| c.kind() == token);
    result
}

/// Dotted surface name of an identifier / member chain (`this.svc.load`).
fn dotted_name(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" | "type_identifier" | "property_identifier" | "this" | "super" => {
            Some(node_text(node, source).to_string())
        }
        "member_expression" => {
            let object = node
                .child_by_field_name("object")
                .and_then(|o| dotted_name(o, source))?;
            let property = node
                .child_by_field_name("property")
                .map(|p| node_text(p, source))?;
            Some(format!("{object}.{property}"))
        }
        "call_expression" => node
            .child_by_field_name("function")
            .and_then(|f| dotted_name(f, source)),
        "generic_type" => node
            .child_by_field_name("name")
            .and_then(|n| dotted_name(n, source)),
        _ => None,
    }
}

fn decorator_name(node: Node<'_>, source: &str) -> Option<String> {
    named_children(node)
        .into_iter()
        .next()
        .and_then(|inner| dotted_name(inner, source))
}

/// Base 1, +1 per branch construct, +1 per `&&`/`||` operator.
fn cyclomatic_complexity(node: Node<'_>) -> u64 {
    fn count(node: Node<'_>, source_root: bool) -> u64 {
        // Nested function bodies keep their own complexity.
        if !source_root
            && matches!(
                node.kind(),
                "function_declaration"
                    | "generator_function_declaration"
                    | "method_definition"
                    | "arrow_function"
                    | "function_expression"
            )
        {
            return 0;
        }
        let own = match node.kind() {
            "if_statement" | "while_statement" | "do_statement" | "for_statement"
            | "for_in_statement" | "catch_clause" | "ternary_expression" | "switch_case" => 1,
            "binary_expression" => {
                let operator = node
                    .child_by_field_name("operator")
                    .map(|o| o.kind())
                    .unwrap_or("");
                u64::from(operator == "&&" || operator == "||")
            }
            _ => 0,
        };
        let mut cursor = node.walk();
        own + node
            .named_children(&mut cursor)
            .map(|c| count(c, false))
            .sum::<u64>()
    }
    1 + node
        .child_by_field_name("body")
        .map(|b| count(b, true))
        .unwrap_or(0)
}

/// Flatten a config array (`imports: [A, B]`) into a comma-joined string.
fn join_list(value: &Value) -> Value {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| v.to_string())
            })
            .collect::<Vec<_>>()
            .join(",")
            .into(),
        other => other.clone(),
    }
}

fn infer_type(node: Node<'_>) -> String {
    match node.kind() {
        "string" | "template_string" => "string".into(),
        "number" => "number".into(),
        "true" | "false" => "boolean".into(),
        "array" => "array".into(),
        "object" => "object".into(),
        "arrow_function" | "function_expression" => "function".into(),
        "new_expression" => "object".into(),
        _ => "unknown".into(),
    }
}

fn strip_quotes(text: &str) -> String {
    let text = text.trim();
    for quote in ["\"", "'", "`"] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return text[1..text.len() - 1].to_string();
        }
    }
    text.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_unresolved;

    fn parse_named(name: &str, kind: FileKind, source: &str) -> ParseResult {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, source).unwrap();
        parse(&path, kind, &ParserOptions::default())
    }

    fn parse_ts(source: &str) -> ParseResult {
        parse_named("sample.ts", FileKind::TypeScript, source)
    }

    fn find<'r>(result: &'r ParseResult, kind: EntityKind, name: &str) -> &'r Entity {
        result
            .entities
            .iter()
            .find(|e| e.kind == kind && e.name == name)
            .unwrap_or_else(|| panic!("no {kind} named {name}"))
    }

    fn edges_of<'r>(result: &'r ParseResult, name: &str) -> Vec<&'r Relationship> {
        result
            .relationships
            .iter()
            .filter(|r| r.kind.name() == name)
            .collect()
    }

    // -- classes and members -------------------------------------------------

    #[test]
    fn class_with_members() {
        let result = parse_ts(
            r#"
class UserService {
    private count: number = 0;

    constructor(private http: HttpClient) {}

    getUser(id: number): User {
        return this.http.get(id);
    }

    get total(): number { return this.count; }
    set total(v: number) { this.count = v; }
}
"#,
        );
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        let class = find(&result, EntityKind::Class, "UserService");
        assert_eq!(class.metadata.get("method_count"), Some(&Value::from(4)));
        assert_eq!(class.metadata.get("property_count"), Some(&Value::from(1)));

        let ctor = find(&result, EntityKind::Constructor, "constructor");
        assert_eq!(ctor.attr_str("class_id"), Some(class.id.as_str()));
        find(&result, EntityKind::Getter, "total");
        find(&result, EntityKind::Setter, "total");
        let get_user = find(&result, EntityKind::Method, "getUser");
        assert_eq!(get_user.attr_str("return_type"), Some("User"));

        // Scope edge and file edge both present.
        assert!(edges_of(&result, "CLASS_CONTAINS_METHOD")
            .iter()
            .any(|r| r.from_id == class.id && r.to_id == get_user.id));
        assert!(edges_of(&result, "FILE_CONTAINS_METHOD")
            .iter()
            .any(|r| r.to_id == get_user.id));
    }

    #[test]
    fn extends_and_implements() {
        let result = parse_ts(
            "interface Greeter { greet(): string; }\nclass Base {}\nclass Impl extends Base implements Greeter {\n    greet() { return 'hi'; }\n}\n",
        );
        let impl_class = find(&result, EntityKind::Class, "Impl");
        assert_eq!(impl_class.attr_str("extends"), Some("Base"));

        let extends = edges_of(&result, "EXTENDS");
        assert_eq!(extends.len(), 1);
        assert_eq!(
            parse_unresolved(&extends[0].to_id),
            Some((RefTag::External, "Base"))
        );

        let implements = edges_of(&result, "IMPLEMENTS");
        assert_eq!(implements.len(), 1);
        assert_eq!(
            parse_unresolved(&implements[0].to_id),
            Some((RefTag::External, "Greeter"))
        );

        let greeter = find(&result, EntityKind::Interface, "Greeter");
        assert_eq!(greeter.metadata.get("method_count"), Some(&Value::from(1)));
    }

    // -- imports / exports ---------------------------------------------------

    #[test]
    fn named_import_emits_module_edge_and_uses() {
        let result = parse_ts("import { Component, OnInit } from '@angular/core';\n");
        let import = find(&result, EntityKind::Import, "Component");
        assert_eq!(import.attr_str("module_name"), Some("@angular/core"));
        assert_eq!(import.attr_str("import_type"), Some("named"));

        let imports = edges_of(&result, "IMPORTS");
        assert_eq!(imports.len(), 1);
        assert_eq!(
            parse_unresolved(&imports[0].to_id),
            Some((RefTag::Module, "@angular/core"))
        );

        let uses = edges_of(&result, "USES");
        assert_eq!(uses.len(), 2);
        assert!(uses
            .iter()
            .all(|r| r.metadata.get("usage_type") == Some(&Value::from("named_import"))));
    }

    #[test]
    fn default_and_namespace_imports() {
        let result = parse_ts("import React from 'react';\nimport * as path from './path';\n");
        let react = find(&result, EntityKind::Import, "React");
        assert_eq!(react.attr_str("import_type"), Some("default"));
        let ns = find(&result, EntityKind::Import, "path");
        assert_eq!(ns.attr_str("import_type"), Some("namespace"));
        assert_eq!(ns.metadata.get("is_relative"), Some(&Value::from(true)));
    }

    #[test]
    fn export_shapes() {
        let result = parse_ts(
            "export class Widget {}\nconst helper = 1;\nexport { helper };\nexport default Widget;\n",
        );
        let widget = find(&result, EntityKind::Class, "Widget");
        assert_eq!(widget.metadata.get("exported"), Some(&Value::from(true)));

        let exports = edges_of(&result, "EXPORTS");
        assert!(exports.iter().any(|r| {
            parse_unresolved(&r.to_id) == Some((RefTag::Export, "Widget"))
        }));
        assert!(exports.iter().any(|r| {
            parse_unresolved(&r.to_id) == Some((RefTag::Export, "helper"))
        }));
        assert!(exports
            .iter()
            .any(|r| r.metadata.get("export_type") == Some(&Value::from("default_export"))));

        find(&result, EntityKind::Export, "helper");
        find(&result, EntityKind::Export, "default");
    }

    // -- functions and variables --------------------------------------------

    #[test]
    fn anonymous_arrow_gets_synthesized_name() {
        let result = parse_ts("const add = (a: number, b: number) => a + b;\n");
        let variable = find(&result, EntityKind::Variable, "add");
        assert_eq!(variable.attr_str("type_annotation"), Some("function"));

        let arrow = result
            .entities
            .iter()
            .find(|e| e.kind == EntityKind::Function)
            .expect("arrow function entity");
        assert_eq!(arrow.name, "arrow_function_L1_1");
        assert_eq!(arrow.metadata.get("is_arrow"), Some(&Value::from(true)));
    }

    #[test]
    fn calls_attribute_to_innermost_callable() {
        let result = parse_ts(
            "function outer() {\n    helper();\n    const inner = () => deep();\n}\n",
        );
        let outer = find(&result, EntityKind::Function, "outer");
        let calls = edges_of(&result, "CALLS");
        assert_eq!(calls.len(), 2);

        let helper_call = calls
            .iter()
            .find(|r| parse_unresolved(&r.to_id) == Some((RefTag::Function, "helper")))
            .unwrap();
        assert_eq!(helper_call.from_id, outer.id);

        let deep_call = calls
            .iter()
            .find(|r| parse_unresolved(&r.to_id) == Some((RefTag::Function, "deep")))
            .unwrap();
        assert_ne!(deep_call.from_id, outer.id, "arrow body owns the call");
    }

    #[test]
    fn member_access_emits_full_dotted_path_once() {
        let result = parse_ts(
            "class C {\n    run() {\n        return this.service.client.fetch;\n    }\n}\n",
        );
        let accesses = edges_of(&result, "ACCESSES");
        assert_eq!(accesses.len(), 1);
        assert_eq!(
            accesses[0].metadata.get("property_path"),
            Some(&Value::from("this.service.client.fetch"))
        );
    }

    #[test]
    fn method_call_type() {
        let result = parse_ts("function f() { obj.method(); plain(); }\n");
        let calls = edges_of(&result, "CALLS");
        let method = calls
            .iter()
            .find(|r| parse_unresolved(&r.to_id) == Some((RefTag::Function, "obj.method")))
            .unwrap();
        assert_eq!(
            method.metadata.get("call_type"),
            Some(&Value::from("method_call"))
        );
        let plain = calls
            .iter()
            .find(|r| parse_unresolved(&r.to_id) == Some((RefTag::Function, "plain")))
            .unwrap();
        assert_eq!(
            plain.metadata.get("call_type"),
            Some(&Value::from("function_call"))
        );
    }

    #[test]
    fn complexity_counts_branches() {
        let result = parse_ts(
            "function decide(a: boolean, b: boolean) {\n    if (a && b) { return 1; }\n    for (let i = 0; i < 3; i++) { }\n    return a ? 2 : 3;\n}\n",
        );
        let decide = find(&result, EntityKind::Function, "decide");
        // base 1 + if + && + for + ternary
        assert_eq!(decide.metadata.get("complexity"), Some(&Value::from(5)));
    }

    #[test]
    fn enum_and_type_alias() {
        let result = parse_ts(
            "enum Direction { North, South }\ntype UserId = string | number;\n",
        );
        let direction = find(&result, EntityKind::Enum, "Direction");
        assert_eq!(direction.attr_str("values"), Some("North,South"));
        let alias = find(&result, EntityKind::TypeAlias, "UserId");
        assert_eq!(alias.attr_str("type_definition"), Some("string | number"));
    }

    // -- Angular -------------------------------------------------------------

    #[test]
    fn component_decorator_projects_entity_and_asset_edges() {
        let result = parse_named(
            "nav.component.ts",
            FileKind::Angular,
            r#"
import { Component } from '@angular/core';

@Component({
    selector: 'app-nav',
    templateUrl: './nav.component.html',
    styleUrls: ['./nav.component.scss'],
    standalone: true,
})
export class NavComponent {
    items: string[] = [];
}
"#,
        );
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        // Both the class entity and the projected framework sibling exist.
        let class = find(&result, EntityKind::Class, "NavComponent");
        let component = find(&result, EntityKind::AngularComponent, "app-nav");
        assert_ne!(class.id, component.id);
        assert_eq!(component.attr_str("selector"), Some("app-nav"));
        assert_eq!(
            component.attr_str("template_url"),
            Some("./nav.component.html")
        );
        assert_eq!(
            component.metadata.get("standalone"),
            Some(&Value::from(true))
        );
        assert_eq!(component.attr_str("class_name"), Some("NavComponent"));

        let templates = edges_of(&result, "USES_TEMPLATE");
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].from_id, component.id);
        assert_eq!(
            parse_unresolved(&templates[0].to_id),
            Some((RefTag::Template, "./nav.component.html"))
        );
        assert_eq!(
            templates[0].metadata.get("component_selector"),
            Some(&Value::from("app-nav"))
        );
        assert!(templates[0].metadata.contains_key("component_file_path"));

        let styles = edges_of(&result, "USES_STYLES");
        assert_eq!(styles.len(), 1);
        assert_eq!(
            parse_unresolved(&styles[0].to_id),
            Some((RefTag::Style, "./nav.component.scss"))
        );

        assert_eq!(edges_of(&result, "FILE_CONTAINS_ANGULARCOMPONENT").len(), 1);
    }

    #[test]
    fn inline_template_and_styles_use_synthetic_keys() {
        let result = parse_named(
            "tiny.component.ts",
            FileKind::Angular,
            "import { Component } from '@angular/core';\n\n@Component({\n    selector: 'app-tiny',\n    template: '<p>hi</p>',\n    styles: ['p { color: red; }'],\n})\nexport class TinyComponent {}\n",
        );
        let component = find(&result, EntityKind::AngularComponent, "app-tiny");

        let templates = edges_of(&result, "USES_TEMPLATE");
        assert_eq!(templates.len(), 1);
        assert_eq!(
            parse_unresolved(&templates[0].to_id),
            Some((RefTag::InlineTemplate, component.id.as_str()))
        );
        assert_eq!(
            templates[0].metadata.get("template_path"),
            Some(&Value::from("inline"))
        );

        let styles = edges_of(&result, "USES_STYLES");
        assert_eq!(styles.len(), 1);
        assert_eq!(
            parse_unresolved(&styles[0].to_id),
            Some((RefTag::InlineStyles, component.id.as_str()))
        );
    }

    #[test]
    fn injectable_takes_class_name() {
        let result = parse_named(
            "user.service.ts",
            FileKind::Angular,
            "import { Injectable } from '@angular/core';\n\n@Injectable({ providedIn: 'root' })\nexport class UserService {}\n",
        );
        let service = find(&result, EntityKind::AngularService, "UserService");
        assert_eq!(service.attr_str("provided_in"), Some("root"));
    }

    #[test]
    fn ng_module_records_membership_lists() {
        let result = parse_named(
            "app.module.ts",
            FileKind::Angular,
            "import { NgModule } from '@angular/core';\n\n@NgModule({\n    declarations: [AppComponent],\n    imports: [BrowserModule, FormsModule],\n    providers: [],\n})\nexport class AppModule {}\n",
        );
        let module = find(&result, EntityKind::AngularModule, "AppModule");
        assert_eq!(module.attr_str("declarations"), Some("AppComponent"));
        assert_eq!(module.attr_str("imports"), Some("BrowserModule,FormsModule"));
    }

    #[test]
    fn input_output_fields_project_entities() {
        let result = parse_named(
            "badge.component.ts",
            FileKind::Angular,
            "import { Component, Input, Output, EventEmitter } from '@angular/core';\n\n@Component({ selector: 'app-badge', template: '' })\nexport class BadgeComponent {\n    @Input('label') text: string = '';\n    @Output() clicked: EventEmitter<void> = new EventEmitter();\n}\n",
        );
        let input = find(&result, EntityKind::AngularInput, "text");
        assert_eq!(input.attr_str("input_name"), Some("label"));
        let output = find(&result, EntityKind::AngularOutput, "clicked");
        assert_eq!(output.attr_str("output_name"), Some("clicked"));
        assert_eq!(output.attr_str("event_type"), Some("EventEmitter<void>"));
    }

    #[test]
    fn plain_decorator_creates_decorator_entity() {
        let result = parse_ts(
            "function Sealed(target: any) {}\n\n@Sealed\nclass Box {}\n",
        );
        let decorator = find(&result, EntityKind::Decorator, "Sealed");
        let class = find(&result, EntityKind::Class, "Box");
        let decorates = edges_of(&result, "DECORATES");
        assert_eq!(decorates.len(), 1);
        assert_eq!(decorates[0].from_id, decorator.id);
        assert_eq!(decorates[0].to_id, class.id);
    }

    // -- javascript grammar --------------------------------------------------

    #[test]
    fn javascript_parses_with_js_grammar() {
        let result = parse_named(
            "util.js",
            FileKind::JavaScript,
            "const helper = (x) => x * 2;\n\nfunction main() {\n    return helper(21);\n}\n\nmodule.exports = { main };\n",
        );
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        find(&result, EntityKind::Function, "main");
        find(&result, EntityKind::Variable, "helper");
        assert_eq!(result.entities[0].attr_str("language"), Some("javascript"));
    }

    // -- failure semantics ---------------------------------------------------

    #[test]
    fn syntax_error_keeps_file_entity_only() {
        let result = parse_ts("class {{{\n");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].kind, EntityKind::File);
        assert!(!result.file_hash.is_empty());
    }

    #[test]
    fn parse_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.ts");
        std::fs::write(
            &path,
            "export class A { run() { return this.x.y; } }\n",
        )
        .unwrap();

        let ids = |r: &ParseResult| {
            let mut v: Vec<String> = r.entities.iter().map(|e| e.id.clone()).collect();
            v.sort();
            v
        };
        let first = parse(&path, FileKind::TypeScript, &ParserOptions::default());
        let second = parse(&path, FileKind::TypeScript, &ParserOptions::default());
        assert_eq!(ids(&first), ids(&second));
    }
}
