//! File classification: path → language tag.
//!
//! Matching order matters: composite framework suffixes win over plain
//! extensions (so `nav.component.ts` classifies as `angular`, not
//! `typescript`), then the extension map, then whole-filename matches for
//! extensionless files like `Dockerfile`.

use std::path::Path;

use crate::types::FileKind;

/// Composite suffix patterns, checked before plain extensions.
const COMPOSITE_SUFFIXES: &[(&str, FileKind)] = &[
    (".component.ts", FileKind::Angular),
    (".module.ts", FileKind::Angular),
    (".service.ts", FileKind::Angular),
    (".guard.ts", FileKind::Angular),
    (".pipe.ts", FileKind::Angular),
    (".component.html", FileKind::Html),
    (".component.css", FileKind::Css),
];

/// Whole-filename matches for extensionless files.
const FILENAME_MATCHES: &[(&str, FileKind)] = &[("Dockerfile", FileKind::Dockerfile)];

/// Classify a path into a language tag, or `None` if the file is not
/// parseable. Pure; never touches the filesystem.
pub fn classify(path: &Path) -> Option<FileKind> {
    let file_name = path.file_name()?.to_str()?;

    for (suffix, kind) in COMPOSITE_SUFFIXES {
        if file_name.ends_with(suffix) {
            return Some(*kind);
        }
    }

    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        return classify_extension(ext);
    }

    FILENAME_MATCHES
        .iter()
        .find(|(name, _)| *name == file_name)
        .map(|(_, kind)| *kind)
}

fn classify_extension(ext: &str) -> Option<FileKind> {
    match ext {
        "py" | "pyw" | "pyi" => Some(FileKind::Python),
        "js" | "jsx" | "mjs" => Some(FileKind::JavaScript),
        "ts" | "tsx" => Some(FileKind::TypeScript),
        "html" | "htm" => Some(FileKind::Html),
        "css" | "scss" | "sass" => Some(FileKind::Css),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
