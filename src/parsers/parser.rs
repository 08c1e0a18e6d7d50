//! Native tree-sitter wrapper.
//!
//! Grammars are statically linked, so there is no runtime setup. `CstParser`
//! carries no fields: tree-sitter's `Parser` is `!Send + !Sync`, so a fresh
//! parser is created on every call instead of wrestling with thread-safety
//! wrappers — `Parser::new()` is a single allocation and `set_language` is a
//! pointer swap, which keeps the parse phase freely parallelizable.

use crate::error::{CodeAtlasError, Result};
use crate::types::FileKind;

/// The grammar used to parse a classified file, where one exists.
/// HTML, CSS, and Dockerfile files go through text-based parsers instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Python,
    TypeScript,
    JavaScript,
}

impl Grammar {
    /// The grammar for a language tag, `None` for text-parsed kinds.
    pub fn for_kind(kind: FileKind) -> Option<Self> {
        match kind {
            FileKind::Python => Some(Self::Python),
            FileKind::TypeScript | FileKind::Angular => Some(Self::TypeScript),
            FileKind::JavaScript => Some(Self::JavaScript),
            FileKind::Html | FileKind::Css | FileKind::Dockerfile => None,
        }
    }

    fn ts_language(&self) -> tree_sitter::Language {
        match self {
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

/// Thin wrapper around native tree-sitter parsing. Zero-sized, `Send`,
/// `Sync`; create once and reuse freely.
pub struct CstParser;

impl CstParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse `content` with `grammar` and return the concrete syntax tree.
    pub fn parse(&self, content: &str, grammar: Grammar) -> Result<tree_sitter::Tree> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&grammar.ts_language())
            .map_err(|e| CodeAtlasError::Parse(format!("language version mismatch: {e}")))?;

        parser.parse(content, None).ok_or_else(|| {
            CodeAtlasError::Parse("tree-sitter returned no tree (timeout or cancellation)".into())
        })
    }
}

impl Default for CstParser {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Node helpers shared by the CST walkers
// ---------------------------------------------------------------------------

/// Source text of a node.
pub fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// 1-indexed `(start_line, end_line)` of a node.
pub fn node_lines(node: tree_sitter::Node<'_>) -> (u32, u32) {
    (
        node.start_position().row as u32 + 1,
        node.end_position().row as u32 + 1,
    )
}

/// Synthesize a stable name for an anonymous declaration,
/// e.g. `arrow_function_L10_12`.
pub fn anonymous_name(form: &str, start_line: u32, end_line: u32) -> String {
    format!("{form}_L{start_line}_{end_line}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_python_returns_valid_tree() {
        let parser = CstParser::new();
        let source = "\ndef greet(name):\n    return f\"Hello, {name}!\"\n\nclass User:\n    def get(self):\n        return self.name\n";
        let tree = parser.parse(source, Grammar::Python).expect("should parse");
        let root = tree.root_node();
        assert_eq!(root.kind(), "module");
        assert!(!root.has_error());
    }

    #[test]
    fn parse_typescript_returns_valid_tree() {
        let parser = CstParser::new();
        let source = r#"
            export function greet(name: string): string {
                return `Hello, ${name}!`;
            }

            class UserService {
                getUser(id: number) { return { id }; }
            }
        "#;
        let tree = parser
            .parse(source, Grammar::TypeScript)
            .expect("should parse");
        assert_eq!(tree.root_node().kind(), "program");
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn parse_javascript_returns_valid_tree() {
        let parser = CstParser::new();
        let source = "const add = (a, b) => a + b;\nfunction mul(a, b) { return a * b; }\n";
        let tree = parser
            .parse(source, Grammar::JavaScript)
            .expect("should parse");
        assert_eq!(tree.root_node().kind(), "program");
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn parse_empty_source_returns_tree() {
        let parser = CstParser::new();
        let tree = parser.parse("", Grammar::TypeScript).expect("should parse");
        assert_eq!(tree.root_node().child_count(), 0);
    }

    #[test]
    fn grammar_for_kind_mapping() {
        assert_eq!(Grammar::for_kind(FileKind::Python), Some(Grammar::Python));
        assert_eq!(
            Grammar::for_kind(FileKind::Angular),
            Some(Grammar::TypeScript)
        );
        assert_eq!(
            Grammar::for_kind(FileKind::JavaScript),
            Some(Grammar::JavaScript)
        );
        assert_eq!(Grammar::for_kind(FileKind::Html), None);
        assert_eq!(Grammar::for_kind(FileKind::Css), None);
    }

    #[test]
    fn node_helpers() {
        let parser = CstParser::new();
        let source = "def f():\n    pass\n";
        let tree = parser.parse(source, Grammar::Python).unwrap();
        let func = tree.root_node().child(0).unwrap();
        assert_eq!(func.kind(), "function_definition");
        assert_eq!(node_lines(func), (1, 2));
        assert!(node_text(func, source).starts_with("def f()"));
        assert_eq!(anonymous_name("arrow_function", 3, 7), "arrow_function_L3_7");
    }
}
