//! CSS/SCSS parser.
//!
//! Text-based: emits the File entity enriched with selector/import counts
//! and nesting depth, plus `IMPORTS_STYLE` unresolved references for
//! `@import` / `@use` / `@forward` targets so stylesheet dependencies land
//! in the graph.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::parsers::{file_entity, read_source};
use crate::types::{unresolved, FileKind, ParseResult, RefTag, RelKind, Relationship};

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"@(?:import|use|forward)\s+(?:url\()?["']([^"')]+)["']\)?"#)
            .expect("import pattern")
    })
}

/// Parse a CSS/SCSS/Sass file.
pub fn parse(path: &Path) -> ParseResult {
    let file_path = path.to_string_lossy().into_owned();
    let (source, hash) = match read_source(path) {
        Ok(pair) => pair,
        Err(e) => return ParseResult::failed(file_path, format!("failed to read file: {e}")),
    };

    let mut file = file_entity(path, FileKind::Css, &source, &hash);

    let imports: Vec<(String, u32)> = import_pattern()
        .captures_iter(&source)
        .map(|capture| {
            let target = capture[1].to_string();
            let line = source[..capture.get(0).map(|m| m.start()).unwrap_or(0)]
                .lines()
                .count() as u32
                + 1;
            (target, line)
        })
        .collect();

    file.set_attr("selector_count", count_selectors(&source));
    file.set_attr("import_count", imports.len() as u64);
    file.set_attr("nesting_depth", max_nesting_depth(&source));
    file.set_attr("variable_count", count_scss_variables(&source));

    let relationships: Vec<Relationship> = imports
        .into_iter()
        .map(|(target, line)| {
            Relationship::new(
                file.id.clone(),
                unresolved(RefTag::Style, &target),
                RelKind::ImportsStyle,
            )
            .with_attr("style_path", target)
            .with_attr("line_number", line)
        })
        .collect();

    ParseResult {
        file_path,
        entities: vec![file],
        relationships,
        file_hash: hash,
        errors: Vec::new(),
        parse_time: std::time::Duration::ZERO,
    }
}

/// Count rule selectors: `{`-introduced blocks that are not at-rule bodies.
fn count_selectors(source: &str) -> u64 {
    let mut count = 0u64;
    for raw_line in source.lines() {
        let line = raw_line.trim();
        if line.starts_with("//") || line.starts_with("/*") || line.starts_with('@') {
            continue;
        }
        if line.contains('{') && !line.starts_with('}') {
            count += 1;
        }
    }
    count
}

/// Maximum brace nesting depth (SCSS nesting produces > 1).
fn max_nesting_depth(source: &str) -> u64 {
    let mut depth: i64 = 0;
    let mut max_depth: i64 = 0;
    for ch in source.chars() {
        match ch {
            '{' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            '}' => depth = (depth - 1).max(0),
            _ => {}
        }
    }
    max_depth as u64
}

/// Count SCSS variable declarations (`$name: value`).
fn count_scss_variables(source: &str) -> u64 {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"(?m)^\s*\$[a-zA-Z][\w-]*\s*:").expect("variable pattern"));
    pattern.find_iter(source).count() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
