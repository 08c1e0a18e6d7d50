//! HTML parser with Angular template support.
//!
//! Text-based: emits the File entity enriched with template metadata
//! (directive, binding, and interpolation counts, custom component tags)
//! plus `USES_COMPONENT` unresolved references for `<app-*>` tags. No
//! cross-file edges beyond those references.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::parsers::{file_entity, read_source};
use crate::types::{unresolved, FileKind, ParseResult, RefTag, RelKind, Relationship};

struct TemplatePatterns {
    directive: Regex,
    property_binding: Regex,
    event_binding: Regex,
    interpolation: Regex,
    reference_var: Regex,
    custom_component: Regex,
    material_component: Regex,
}

fn patterns() -> &'static TemplatePatterns {
    static PATTERNS: OnceLock<TemplatePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| TemplatePatterns {
        directive: Regex::new(r"\*ng[A-Z][a-zA-Z]*").expect("directive pattern"),
        property_binding: Regex::new(r"\[[^\]\n]+\]").expect("property binding pattern"),
        event_binding: Regex::new(r"\([^)\n]+\)\s*=").expect("event binding pattern"),
        interpolation: Regex::new(r"\{\{[^}]*\}\}").expect("interpolation pattern"),
        reference_var: Regex::new(r"#[a-zA-Z][a-zA-Z0-9]*").expect("reference pattern"),
        custom_component: Regex::new(r"<(app-[a-z][a-z0-9-]*)").expect("component pattern"),
        material_component: Regex::new(r"<(mat-[a-z][a-z0-9-]*)").expect("material pattern"),
    })
}

/// Parse an HTML file.
pub fn parse(path: &Path) -> ParseResult {
    let file_path = path.to_string_lossy().into_owned();
    let (source, hash) = match read_source(path) {
        Ok(pair) => pair,
        Err(e) => return ParseResult::failed(file_path, format!("failed to read file: {e}")),
    };

    let mut file = file_entity(path, FileKind::Html, &source, &hash);
    let patterns = patterns();

    let directives: BTreeSet<String> = patterns
        .directive
        .find_iter(&source)
        .map(|m| m.as_str().to_string())
        .collect();
    let custom_components: BTreeSet<String> = patterns
        .custom_component
        .captures_iter(&source)
        .map(|c| c[1].to_string())
        .collect();
    let material_components: BTreeSet<String> = patterns
        .material_component
        .captures_iter(&source)
        .map(|c| c[1].to_string())
        .collect();

    let is_angular_template = !directives.is_empty()
        || !custom_components.is_empty()
        || !material_components.is_empty()
        || patterns.interpolation.is_match(&source)
        || patterns.reference_var.is_match(&source);

    file.set_attr("is_template", true);
    file.set_attr(
        "template_type",
        if is_angular_template { "angular" } else { "html" },
    );
    if is_angular_template {
        file.set_attr("framework", "angular");
        file.set_attr(
            "angular_directives",
            Value::Array(directives.iter().cloned().map(Value::from).collect()),
        );
        file.set_attr(
            "property_bindings",
            patterns.property_binding.find_iter(&source).count() as u64,
        );
        file.set_attr(
            "event_bindings",
            patterns.event_binding.find_iter(&source).count() as u64,
        );
        file.set_attr(
            "interpolations",
            patterns.interpolation.find_iter(&source).count() as u64,
        );
        file.set_attr(
            "custom_components",
            Value::Array(custom_components.iter().cloned().map(Value::from).collect()),
        );
        file.set_attr(
            "material_components",
            Value::Array(
                material_components.iter().cloned().map(Value::from).collect(),
            ),
        );
    }

    let relationships: Vec<Relationship> = custom_components
        .iter()
        .map(|tag| {
            Relationship::new(
                file.id.clone(),
                unresolved(RefTag::AngularComponent, tag),
                RelKind::UsesComponent,
            )
            .with_attr("component_tag", tag.clone())
            .with_attr("usage_type", "template_reference")
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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{parse_unresolved, EntityKind};

    fn parse_source(source: &str) -> ParseResult {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view.component.html");
        std::fs::write(&path, source).unwrap();
        parse(&path)
    }

    #[test]
    fn angular_template_metadata() {
        let result = parse_source(
            r#"<div *ngIf="visible">
    <app-user-card [user]="user" (selected)="onSelect($event)"></app-user-card>
    <mat-icon>home</mat-icon>
    <span>{{ user.name }}</span>
    <ul>
        <li *ngFor="let item of items">{{ item }}</li>
    </ul>
</div>
"#,
        );
        assert!(result.errors.is_empty());
        let file = &result.entities[0];
        assert_eq!(file.kind, EntityKind::File);
        assert_eq!(file.attr_str("template_type"), Some("angular"));
        assert_eq!(file.attr_str("framework"), Some("angular"));

        let directives = file.metadata.get("angular_directives").unwrap();
        assert_eq!(
            directives,
            &serde_json::json!(["*ngFor", "*ngIf"]),
        );
        assert_eq!(
            file.metadata.get("interpolations"),
            Some(&Value::from(2))
        );
        assert_eq!(
            file.metadata.get("custom_components"),
            Some(&serde_json::json!(["app-user-card"]))
        );
        assert_eq!(
            file.metadata.get("material_components"),
            Some(&serde_json::json!(["mat-icon"]))
        );
    }

    #[test]
    fn custom_components_emit_unresolved_references() {
        let result = parse_source("<app-nav></app-nav>\n<app-nav></app-nav>\n<app-footer/>\n");
        assert_eq!(result.relationships.len(), 2); // deduplicated by tag
        let mut tags: Vec<_> = result
            .relationships
            .iter()
            .map(|r| parse_unresolved(&r.to_id).unwrap().1.to_string())
            .collect();
        tags.sort();
        assert_eq!(tags, vec!["app-footer", "app-nav"]);
        assert!(result
            .relationships
            .iter()
            .all(|r| r.kind.name() == "USES_COMPONENT"));
    }

    #[test]
    fn plain_html_is_not_flagged_angular() {
        let result = parse_source("<html><body><h1>Title</h1></body></html>\n");
        let file = &result.entities[0];
        assert_eq!(file.attr_str("template_type"), Some("html"));
        assert!(file.metadata.get("framework").is_none());
        assert!(result.relationships.is_empty());
    }
}
