//! Deterministic source-tree traversal.
//!
//! Walks the project root, applies exclude globs, the size cap, and the
//! symlink policy, and returns classifiable files in lexical order by full
//! path. Permission errors are logged and skipped; the walk never aborts.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::{CodeAtlasError, Result};
use crate::indexer::classifier::classify;
use crate::types::{posix_path, FileKind};

/// A discovered, classified source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub path: PathBuf,
    pub kind: FileKind,
}

/// Walker configuration, taken from `parsing.*` config keys.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub exclude_patterns: Vec<String>,
    pub max_file_size: u64,
    pub follow_symlinks: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            max_file_size: 1024 * 1024,
            follow_symlinks: false,
        }
    }
}

/// Exclusion matcher applying each glob to the filename, the full path, and
/// every single path component.
#[derive(Debug)]
pub struct ExcludeSet {
    globs: GlobSet,
}

impl ExcludeSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                CodeAtlasError::Configuration(format!("bad exclude pattern {pattern:?}: {e}"))
            })?;
            builder.add(glob);
        }
        let globs = builder
            .build()
            .map_err(|e| CodeAtlasError::Configuration(format!("exclude patterns: {e}")))?;
        Ok(Self { globs })
    }

    /// Whether `path` is excluded.
    pub fn matches(&self, path: &Path) -> bool {
        if self.globs.is_empty() {
            return false;
        }
        if let Some(name) = path.file_name() {
            if self.globs.is_match(Path::new(name)) {
                return true;
            }
        }
        if self.globs.is_match(Path::new(&posix_path(&path.to_string_lossy()))) {
            return true;
        }
        path.components().any(|component| {
            matches!(component, std::path::Component::Normal(part) if self.globs.is_match(Path::new(part)))
        })
    }
}

/// Walk `root` and return the sorted list of parseable files.
///
/// Idempotent and order-deterministic: two walks of an unchanged tree return
/// identical lists.
pub fn walk(root: &Path, options: &WalkOptions) -> Result<Vec<WalkedFile>> {
    let excludes = ExcludeSet::new(&options.exclude_patterns)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_symlinks)
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && excludes.matches(entry.path())));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if excludes.matches(path) {
            continue;
        }
        if !options.follow_symlinks && entry.path_is_symlink() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) if meta.len() > options.max_file_size => {
                tracing::debug!("skipping large file: {}", path.display());
                continue;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!("cannot stat {}: {err}", path.display());
                continue;
            }
        }
        if let Some(kind) = classify(path) {
            files.push(WalkedFile {
                path: path.to_path_buf(),
                kind,
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn walk_returns_sorted_classified_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.py", "x = 1\n");
        touch(dir.path(), "a.ts", "const x = 1;\n");
        touch(dir.path(), "notes.md", "# skip me\n");

        let files = walk(dir.path(), &WalkOptions::default()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.ts", "b.py"]);
        assert_eq!(files[0].kind, FileKind::TypeScript);
        assert_eq!(files[1].kind, FileKind::Python);
    }

    #[test]
    fn walk_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "x/a.py", "a = 1\n");
        touch(dir.path(), "y/b.py", "b = 2\n");

        let first = walk(dir.path(), &WalkOptions::default()).unwrap();
        let second = walk(dir.path(), &WalkOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn excluded_directory_is_pruned() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/a.py", "a = 1\n");
        touch(dir.path(), "node_modules/pkg/index.js", "x");
        touch(dir.path(), "__pycache__/a.pyc", "x");

        let options = WalkOptions {
            exclude_patterns: vec!["node_modules".into(), "__pycache__".into()],
            ..WalkOptions::default()
        };
        let files = walk(dir.path(), &options).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("src/a.py"));
    }

    #[test]
    fn exclude_matches_filename_glob() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.spec.ts", "x");
        touch(dir.path(), "a.ts", "x");

        let options = WalkOptions {
            exclude_patterns: vec!["*.spec.ts".into()],
            ..WalkOptions::default()
        };
        let files = walk(dir.path(), &options).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("a.ts"));
    }

    #[test]
    fn exclude_matches_any_path_component() {
        let excludes = ExcludeSet::new(&["dist".to_string()]).unwrap();
        assert!(excludes.matches(Path::new("proj/dist/app.js")));
        assert!(excludes.matches(Path::new("dist")));
        assert!(!excludes.matches(Path::new("proj/distance/app.js")));
    }

    #[test]
    fn oversize_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "big.py", &"x = 1\n".repeat(100));
        touch(dir.path(), "small.py", "x = 1\n");

        let options = WalkOptions {
            max_file_size: 64,
            ..WalkOptions::default()
        };
        let files = walk(dir.path(), &options).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("small.py"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_skipped_unless_followed() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "real.py", "x = 1\n");
        std::os::unix::fs::symlink(dir.path().join("real.py"), dir.path().join("link.py"))
            .unwrap();

        let files = walk(dir.path(), &WalkOptions::default()).unwrap();
        assert_eq!(files.len(), 1);

        let options = WalkOptions {
            follow_symlinks: true,
            ..WalkOptions::default()
        };
        let files = walk(dir.path(), &options).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn bad_pattern_is_configuration_error() {
        let err = ExcludeSet::new(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, CodeAtlasError::Configuration(_)));
    }
}
