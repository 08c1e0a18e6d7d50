//! Python parser.
//!
//! Walks the tree-sitter CST and emits Module/Class/Function/Variable/Import
//! entities with containment, inheritance, call, and decorator edges. Scope
//! stacks keep nested definitions with the same simple name distinct and
//! decide which containment edge family each entity gets; top-level classes
//! and functions get both a module-scoped and a file-scoped containment edge
//! so file-graph queries stay single-hop.

use std::path::Path;

use tree_sitter::Node;

use crate::parsers::parser::{node_lines, node_text, CstParser, Grammar};
use crate::parsers::{file_entity, read_source, ParserOptions};
use crate::types::{
    entity_id, unresolved, Entity, EntityKind, FileKind, ParseResult, RefTag, RelKind,
    Relationship, ScopeKind,
};

/// Parse a Python file into the entity/relationship IR.
pub fn parse(path: &Path, options: &ParserOptions) -> ParseResult {
    let file_path = path.to_string_lossy().into_owned();
    let (source, hash) = match read_source(path) {
        Ok(pair) => pair,
        Err(e) => return ParseResult::failed(file_path, format!("failed to read file: {e}")),
    };

    let mut file = file_entity(path, FileKind::Python, &source, &hash);
    let loc = source
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .count() as u64;
    file.set_attr("lines_of_code", loc);

    let tree = match CstParser::new().parse(&source, Grammar::Python) {
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

    let root = tree.root_node();
    if root.has_error() {
        // Unparseable file: keep the File entity so hash tracking works,
        // emit nothing else.
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

    let mut walker = PyWalker::new(&file_path, &source, &file, options.include_docstrings);
    walker.emit_module(root);
    walker.walk_children(root);

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

struct PyWalker<'a> {
    source: &'a str,
    file_path: &'a str,
    file_id: String,
    line_count: u32,
    module_id: String,
    include_docstrings: bool,
    /// Enclosing class/function names, innermost last; part of entity ids.
    scope_names: Vec<String>,
    /// Enclosing class entity ids, innermost last.
    class_stack: Vec<String>,
    /// Enclosing function entity ids, innermost last.
    function_stack: Vec<String>,
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
}

impl<'a> PyWalker<'a> {
    fn new(file_path: &'a str, source: &'a str, file: &Entity, include_docstrings: bool) -> Self {
        Self {
            source,
            file_path,
            file_id: file.id.clone(),
            line_count: file.line_end,
            module_id: String::new(),
            include_docstrings,
            scope_names: Vec::new(),
            class_stack: Vec::new(),
            function_stack: Vec::new(),
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
        self.relationships
            .push(Relationship::new(from, to, kind));
    }

    // -- module -------------------------------------------------------------

    fn emit_module(&mut self, root: Node<'_>) {
        let stem = Path::new(self.file_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".into());
        let module_id = entity_id(
            self.file_path,
            EntityKind::Module,
            &stem,
            1,
            Some(self.line_count),
            None,
        );

        let mut entity = Entity {
            id: module_id.clone(),
            name: stem,
            kind: EntityKind::Module,
            file_path: self.file_path.to_string(),
            line_start: 1,
            line_end: self.line_count,
            metadata: serde_json::Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        if self.include_docstrings {
            if let Some(doc) = self.docstring_of(root) {
                entity.set_attr("docstring", doc);
            }
        }
        self.entities.push(entity);

        let file_id = self.file_id.clone();
        self.relate(
            &file_id,
            &module_id,
            RelKind::Contains(ScopeKind::File, EntityKind::Module),
        );
        self.module_id = module_id;
    }

    // -- traversal ----------------------------------------------------------

    fn walk_children(&mut self, node: Node<'_>) {
        for child in named_children(node) {
            self.walk(child);
        }
    }

    fn walk(&mut self, node: Node<'_>) {
        match node.kind() {
            "decorated_definition" => {
                let decorators: Vec<Node<'_>> = named_children(node)
                    .into_iter()
                    .filter(|n| n.kind() == "decorator")
                    .collect();
                if let Some(definition) = node.child_by_field_name("definition") {
                    match definition.kind() {
                        "class_definition" => self.visit_class(definition, &decorators),
                        "function_definition" => self.visit_function(definition, &decorators),
                        _ => self.walk_children(node),
                    }
                }
            }
            "class_definition" => self.visit_class(node, &[]),
            "function_definition" => self.visit_function(node, &[]),
            "import_statement" => self.visit_import(node),
            "import_from_statement" => self.visit_import_from(node),
            "call" => {
                self.visit_call(node);
                self.walk_children(node);
            }
            "assignment" => {
                self.visit_assignment(node);
                self.walk_children(node);
            }
            _ => self.walk_children(node),
        }
    }

    // -- classes ------------------------------------------------------------

    fn visit_class(&mut self, node: Node<'_>, decorators: &[Node<'_>]) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.text(n).to_string(),
            None => return,
        };
        let (line_start, line_end) = node_lines(node);
        let class_id = entity_id(
            self.file_path,
            EntityKind::Class,
            &name,
            line_start,
            Some(line_end),
            self.scope().as_deref(),
        );

        let bases: Vec<String> = node
            .child_by_field_name("superclasses")
            .map(|args| {
                named_children(args)
                    .into_iter()
                    .filter_map(|base| dotted_name(base, self.source))
                    .collect()
            })
            .unwrap_or_default();

        let mut entity = Entity {
            id: class_id.clone(),
            name: name.clone(),
            kind: EntityKind::Class,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            metadata: serde_json::Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        entity.set_attr("module_id", self.module_id.clone());
        entity.set_attr("is_abstract", self.is_abstract_class(node, &bases));
        if let Some(parent) = self.class_stack.last() {
            entity.set_attr("parent_class", parent.clone());
        }
        if self.include_docstrings {
            if let Some(body) = node.child_by_field_name("body") {
                if let Some(doc) = self.docstring_of(body) {
                    entity.set_attr("docstring", doc);
                }
            }
        }
        self.entities.push(entity);

        // Scope-chain containment, plus the direct file edge every entity
        // carries so file-graph queries stay single-hop.
        if let Some(parent) = self.class_stack.last().cloned() {
            self.relate(
                &parent,
                &class_id,
                RelKind::Contains(ScopeKind::Class, EntityKind::Class),
            );
        } else {
            let module_id = self.module_id.clone();
            self.relate(
                &module_id,
                &class_id,
                RelKind::Contains(ScopeKind::Module, EntityKind::Class),
            );
        }
        let file_id = self.file_id.clone();
        self.relate(
            &file_id,
            &class_id,
            RelKind::Contains(ScopeKind::File, EntityKind::Class),
        );

        for base in &bases {
            let target = unresolved(RefTag::External, base);
            self.relate(&class_id, &target, RelKind::Inherits);
        }

        self.emit_decorates(decorators, &class_id);

        self.scope_names.push(name);
        self.class_stack.push(class_id);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_children(body);
        }
        self.class_stack.pop();
        self.scope_names.pop();
    }

    // -- functions ----------------------------------------------------------

    fn visit_function(&mut self, node: Node<'_>, decorators: &[Node<'_>]) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.text(n).to_string(),
            None => return,
        };
        let (line_start, line_end) = node_lines(node);
        let function_id = entity_id(
            self.file_path,
            EntityKind::Function,
            &name,
            line_start,
            Some(line_end),
            self.scope().as_deref(),
        );

        let decorator_names: Vec<String> = decorators
            .iter()
            .filter_map(|d| decorator_name(*d, self.source))
            .collect();

        let mut entity = Entity {
            id: function_id.clone(),
            name: name.clone(),
            kind: EntityKind::Function,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            metadata: serde_json::Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        entity.set_attr("module_id", self.module_id.clone());
        if let Some(class_id) = self.class_stack.last() {
            entity.set_attr("class_id", class_id.clone());
        }
        if let Some(parent) = self.function_stack.last() {
            entity.set_attr("parent_function", parent.clone());
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            entity.set_attr("signature", self.text(params));
            entity.set_attr("parameter_count", named_children(params).len() as u64);
        }
        if let Some(ret) = node.child_by_field_name("return_type") {
            entity.set_attr("return_type", self.text(ret));
        }
        entity.set_attr("is_async", has_token(node, "async"));
        entity.set_attr("is_generator", subtree_contains(node, "yield"));
        entity.set_attr(
            "is_property",
            decorator_names.iter().any(|d| d == "property"),
        );
        entity.set_attr(
            "is_staticmethod",
            decorator_names.iter().any(|d| d == "staticmethod"),
        );
        entity.set_attr(
            "is_classmethod",
            decorator_names.iter().any(|d| d == "classmethod"),
        );
        entity.set_attr("complexity", cyclomatic_complexity(node));
        if self.include_docstrings {
            if let Some(body) = node.child_by_field_name("body") {
                if let Some(doc) = self.docstring_of(body) {
                    entity.set_attr("docstring", doc);
                }
            }
        }
        self.entities.push(entity);

        if let Some(class_id) = self.class_stack.last().cloned() {
            self.relate(
                &class_id,
                &function_id,
                RelKind::Contains(ScopeKind::Class, EntityKind::Function),
            );
        } else if let Some(parent) = self.function_stack.last().cloned() {
            self.relate(
                &parent,
                &function_id,
                RelKind::Contains(ScopeKind::Function, EntityKind::Function),
            );
        } else {
            let module_id = self.module_id.clone();
            self.relate(
                &module_id,
                &function_id,
                RelKind::Contains(ScopeKind::Module, EntityKind::Function),
            );
        }
        let file_id = self.file_id.clone();
        self.relate(
            &file_id,
            &function_id,
            RelKind::Contains(ScopeKind::File, EntityKind::Function),
        );

        self.emit_decorates(decorators, &function_id);

        self.scope_names.push(name);
        self.function_stack.push(function_id);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_children(body);
        }
        self.function_stack.pop();
        self.scope_names.pop();
    }

    fn emit_decorates(&mut self, decorators: &[Node<'_>], target_id: &str) {
        for decorator in decorators {
            if let Some(name) = decorator_name(*decorator, self.source) {
                let from = unresolved(RefTag::External, &name);
                self.relationships.push(
                    Relationship::new(from, target_id, RelKind::Decorates)
                        .with_attr("decorator_name", name),
                );
            }
        }
    }

    // -- imports ------------------------------------------------------------

    fn visit_import(&mut self, node: Node<'_>) {
        let (line, _) = node_lines(node);
        for child in named_children(node) {
            let (module_name, alias) = match child.kind() {
                "dotted_name" => (self.text(child).to_string(), None),
                "aliased_import" => {
                    let module = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|n| self.text(n).to_string());
                    (module, alias)
                }
                _ => continue,
            };
            if module_name.is_empty() {
                continue;
            }
            self.emit_import_entity(&module_name, alias, false, line, &module_name);
        }
    }

    fn visit_import_from(&mut self, node: Node<'_>) {
        let (line, _) = node_lines(node);
        let module_name = node
            .child_by_field_name("module_name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();

        for child in named_children(node) {
            match child.kind() {
                "dotted_name" if Some(child) != node.child_by_field_name("module_name") => {
                    let symbol = self.text(child).to_string();
                    let id_key = format!("{module_name}.{symbol}");
                    self.emit_import_entity(&symbol, None, true, line, &id_key);
                }
                "aliased_import" => {
                    let symbol = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|n| self.text(n).to_string());
                    let id_key = format!("{module_name}.{symbol}");
                    self.emit_import_entity(&symbol, alias, true, line, &id_key);
                }
                "wildcard_import" => {
                    let id_key = format!("{module_name}.*");
                    self.emit_import_entity("*", None, true, line, &id_key);
                }
                _ => {}
            }
        }

        // Propagate the source module name into the entities just emitted.
        let module = module_name.clone();
        for entity in self.entities.iter_mut().rev() {
            if entity.kind != EntityKind::Import || entity.line_start != line {
                break;
            }
            entity.set_attr("module_name", module.clone());
        }
    }

    fn emit_import_entity(
        &mut self,
        name: &str,
        alias: Option<String>,
        is_from_import: bool,
        line: u32,
        id_key: &str,
    ) {
        let display = alias.clone().unwrap_or_else(|| name.to_string());
        let import_id = entity_id(
            self.file_path,
            EntityKind::Import,
            id_key,
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
            metadata: serde_json::Map::new(),
        };
        entity.set_attr("file_id", self.file_id.clone());
        entity.set_attr("module_name", name.to_string());
        entity.set_attr("is_from_import", is_from_import);
        if let Some(alias) = alias {
            entity.set_attr("alias", alias);
        }
        self.entities.push(entity);

        let file_id = self.file_id.clone();
        self.relate(
            &file_id,
            &import_id,
            RelKind::Contains(ScopeKind::File, EntityKind::Import),
        );
    }

    // -- calls --------------------------------------------------------------

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
        let target = unresolved(RefTag::Function, &callee);
        self.relationships.push(
            Relationship::new(caller, target, RelKind::Calls)
                .with_attr("call_type", "function_call")
                .with_attr("line_number", line),
        );
    }

    // -- assignments --------------------------------------------------------

    fn visit_assignment(&mut self, node: Node<'_>) {
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        let (line, _) = node_lines(node);
        let annotation = node
            .child_by_field_name("type")
            .map(|t| self.text(t).to_string());
        let inferred = node
            .child_by_field_name("right")
            .map(|value| infer_type(value, self.source));

        for name in assignment_targets(left, self.source) {
            if name.starts_with('_') {
                continue;
            }
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
                metadata: serde_json::Map::new(),
            };
            entity.set_attr("file_id", self.file_id.clone());
            let type_annotation = annotation
                .clone()
                .or_else(|| inferred.clone())
                .unwrap_or_else(|| "unknown".into());
            entity.set_attr("type_annotation", type_annotation);
            entity.set_attr(
                "is_global",
                self.function_stack.is_empty() && self.class_stack.is_empty(),
            );
            entity.set_attr(
                "is_constant",
                !name.is_empty() && name.chars().all(|c| !c.is_lowercase()),
            );
            let scope_id = self
                .function_stack
                .last()
                .or(self.class_stack.last())
                .cloned()
                .unwrap_or_else(|| self.module_id.clone());
            entity.set_attr("scope_id", scope_id);
            self.entities.push(entity);

            if let Some(function_id) = self.function_stack.last().cloned() {
                self.relate(
                    &function_id,
                    &var_id,
                    RelKind::Contains(ScopeKind::Function, EntityKind::Variable),
                );
            } else if let Some(class_id) = self.class_stack.last().cloned() {
                self.relate(
                    &class_id,
                    &var_id,
                    RelKind::Contains(ScopeKind::Class, EntityKind::Variable),
                );
            } else {
                let module_id = self.module_id.clone();
                self.relate(
                    &module_id,
                    &var_id,
                    RelKind::Contains(ScopeKind::Module, EntityKind::Variable),
                );
            }
            let file_id = self.file_id.clone();
            self.relate(
                &file_id,
                &var_id,
                RelKind::Contains(ScopeKind::File, EntityKind::Variable),
            );
        }
    }

    // -- helpers ------------------------------------------------------------

    /// First statement of a block when it is a bare string literal.
    fn docstring_of(&self, body: Node<'_>) -> Option<String> {
        let first = named_children(body).into_iter().next()?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let expr = named_children(first).into_iter().next()?;
        if expr.kind() != "string" {
            return None;
        }
        Some(strip_string_quotes(self.text(expr)))
    }

    fn is_abstract_class(&self, node: Node<'_>, bases: &[String]) -> bool {
        if bases.iter().any(|b| b == "ABC" || b == "abc.ABC") {
            return true;
        }
        let Some(body) = node.child_by_field_name("body") else {
            return false;
        };
        named_children(body).into_iter().any(|child| {
            child.kind() == "decorated_definition"
                && named_children(child).into_iter().any(|d| {
                    d.kind() == "decorator"
                        && matches!(
                            decorator_name(d, self.source).as_deref(),
                            Some("abstractmethod") | Some("abc.abstractmethod")
                        )
                })
        })
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

fn subtree_contains(node: Node<'_>, kind: &str) -> bool {
    if node.kind() == kind {
        return true;
    }
    named_children(node)
        .into_iter()
        // Nested functions own their own yields.
        .filter(|c| c.kind() != "function_definition")
        .any(|c| subtree_contains(c, kind))
}

/// Dotted surface name of an identifier or attribute chain (`self.f`,
/// `abc.ABC`); `None` for anything else.
fn dotted_name(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source).to_string()),
        "attribute" => {
            let object = node
                .child_by_field_name("object")
                .and_then(|o| dotted_name(o, source))?;
            let attr = node
                .child_by_field_name("attribute")
                .map(|a| node_text(a, source))?;
            Some(format!("{object}.{attr}"))
        }
        "call" => node
            .child_by_field_name("function")
            .and_then(|f| dotted_name(f, source)),
        _ => None,
    }
}

fn decorator_name(node: Node<'_>, source: &str) -> Option<String> {
    named_children(node)
        .into_iter()
        .next()
        .and_then(|inner| dotted_name(inner, source))
}

/// Base 1, +1 per branch construct, +1 per boolean operator node (binary
/// nesting makes that n-1 for an n-ary chain).
fn cyclomatic_complexity(node: Node<'_>) -> u64 {
    fn count(node: Node<'_>) -> u64 {
        let own = match node.kind() {
            "if_statement" | "elif_clause" | "while_statement" | "for_statement"
            | "except_clause" | "with_statement" | "boolean_operator" => 1,
            _ => 0,
        };
        own + named_children(node).into_iter().map(count).sum::<u64>()
    }
    1 + node
        .child_by_field_name("body")
        .map(count)
        .unwrap_or(0)
}

fn assignment_targets(node: Node<'_>, source: &str) -> Vec<String> {
    match node.kind() {
        "identifier" => vec![node_text(node, source).to_string()],
        "pattern_list" | "tuple_pattern" | "list_pattern" => named_children(node)
            .into_iter()
            .flat_map(|child| assignment_targets(child, source))
            .collect(),
        _ => Vec::new(),
    }
}

fn infer_type(node: Node<'_>, source: &str) -> String {
    match node.kind() {
        "string" | "concatenated_string" => "str".into(),
        "integer" => "int".into(),
        "float" => "float".into(),
        "true" | "false" => "bool".into(),
        "none" => "NoneType".into(),
        "list" | "list_comprehension" => "list".into(),
        "dictionary" | "dictionary_comprehension" => "dict".into(),
        "set" | "set_comprehension" => "set".into(),
        "tuple" => "tuple".into(),
        "call" => dotted_name(node, source).unwrap_or_else(|| "unknown".into()),
        _ => "unknown".into(),
    }
}

fn strip_string_quotes(text: &str) -> String {
    let text = text.trim();
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if text.len() >= quote.len() * 2 && text.starts_with(quote) && text.ends_with(quote) {
            return text[quote.len()..text.len() - quote.len()].trim().to_string();
        }
    }
    text.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
