//! Configuration for CodeAtlas.
//!
//! Loaded from a `.codeatlas.yml` found by walking up from the working
//! directory; a missing file yields defaults with `project_root` set to the
//! start directory. All relative paths in the configuration resolve against
//! `project_root`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CodeAtlasError, Result};

/// Name of the configuration file discovered by upward search.
pub const CONFIG_FILE_NAME: &str = ".codeatlas.yml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for CodeAtlas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeAtlasConfig {
    /// Base directory; all relative paths resolve against it.
    #[serde(default = "default_project_root")]
    pub project_root: String,

    #[serde(default)]
    pub parsing: ParsingConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub web: WebConfig,

    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CodeAtlasConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            parsing: ParsingConfig::default(),
            database: DatabaseConfig::default(),
            web: WebConfig::default(),
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// ParsingConfig
// ---------------------------------------------------------------------------

/// Knobs for file discovery and parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParsingConfig {
    /// Extensions considered for parsing (informational; the classifier's
    /// fixed maps decide the language).
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,

    /// Glob patterns matched against filename, full path, and any single
    /// path component.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Files larger than this many bytes are skipped.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default)]
    pub follow_symlinks: bool,

    #[serde(default = "default_true")]
    pub include_docstrings: bool,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            file_extensions: default_file_extensions(),
            exclude_patterns: default_exclude_patterns(),
            max_file_size: default_max_file_size(),
            follow_symlinks: false,
            include_docstrings: true,
        }
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

/// Graph store location and write tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Store path, relative to `project_root` unless absolute.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Read-query timeout in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,

    /// Rows per write batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            query_timeout: default_query_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

// ---------------------------------------------------------------------------
// WebConfig
// ---------------------------------------------------------------------------

/// Read limits exposed to downstream visualization adapters.
///
/// The core does not enforce these; they ride along for adapters that do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebConfig {
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,

    #[serde(default = "default_max_edges")]
    pub max_edges: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            max_edges: default_max_edges(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl CodeAtlasConfig {
    /// Find `.codeatlas.yml` by walking up from `start`.
    pub fn find_config_file(start: &Path) -> Option<PathBuf> {
        let mut current = start.canonicalize().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load the configuration for a project rooted at (or above) `start`.
    ///
    /// Missing file → defaults with `project_root = start`. Unreadable or
    /// invalid YAML → fatal configuration error.
    pub fn load(start: &Path) -> Result<Self> {
        match Self::find_config_file(start) {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    CodeAtlasError::Configuration(format!("cannot read {}: {e}", path.display()))
                })?;
                let mut config: Self = serde_yaml::from_str(&text).map_err(|e| {
                    CodeAtlasError::Configuration(format!("invalid {}: {e}", path.display()))
                })?;
                // A relative project_root in the file is relative to the
                // file's own directory.
                if !Path::new(&config.project_root).is_absolute() {
                    if let Some(dir) = path.parent() {
                        config.project_root =
                            dir.join(&config.project_root).to_string_lossy().into_owned();
                    }
                }
                Ok(config)
            }
            None => {
                let mut config = Self::default();
                config.project_root = start.to_string_lossy().into_owned();
                Ok(config)
            }
        }
    }

    /// Absolute path of the graph store.
    pub fn database_path(&self) -> PathBuf {
        let path = Path::new(&self.database.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.project_root).join(path)
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_project_root() -> String {
    ".".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_file_extensions() -> Vec<String> {
    [
        ".py", ".js", ".jsx", ".mjs", ".ts", ".tsx", ".html", ".htm", ".css", ".scss", ".sass",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    [
        "__pycache__",
        "*.pyc",
        ".git",
        "node_modules",
        ".env",
        "venv",
        "env",
        "dist",
        "build",
        ".angular",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_db_path() -> String {
    ".codeatlas/graph.db".to_string()
}

fn default_query_timeout() -> u64 {
    30
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_nodes() -> usize {
    1000
}

fn default_max_edges() -> usize {
    5000
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config() {
        let config = CodeAtlasConfig::default();
        assert_eq!(config.project_root, ".");
        assert_eq!(config.database.batch_size, 1000);
        assert_eq!(config.database.query_timeout, 30);
        assert_eq!(config.parsing.max_file_size, 1024 * 1024);
        assert!(!config.parsing.follow_symlinks);
        assert!(config.parsing.include_docstrings);
        assert_eq!(config.web.max_nodes, 1000);
        assert_eq!(config.web.max_edges, 5000);
        assert!(config
            .parsing
            .exclude_patterns
            .contains(&"node_modules".to_string()));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "database:\n  batch_size: 50\n";
        let config: CodeAtlasConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.batch_size, 50);
        assert_eq!(config.database.query_timeout, 30);
        assert_eq!(config.parsing.max_file_size, 1024 * 1024);
    }

    #[test]
    fn unknown_keys_rejected() {
        let yaml = "databse:\n  batch_size: 50\n";
        assert!(serde_yaml::from_str::<CodeAtlasConfig>(yaml).is_err());
    }

    #[test]
    fn load_missing_file_uses_start_as_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = CodeAtlasConfig::load(dir.path()).unwrap();
        assert_eq!(config.project_root, dir.path().to_string_lossy());
    }

    #[test]
    fn load_discovers_file_upward() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "project_root: \".\"\nparsing:\n  max_file_size: 2048\n",
        )
        .unwrap();

        let config = CodeAtlasConfig::load(&nested).unwrap();
        assert_eq!(config.parsing.max_file_size, 2048);
        // Relative project_root resolves against the config file's directory.
        let root = std::fs::canonicalize(&config.project_root).unwrap();
        assert_eq!(root, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn invalid_yaml_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "parsing: [not, a, map]").unwrap();
        let err = CodeAtlasConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, CodeAtlasError::Configuration(_)));
    }

    #[test]
    fn database_path_resolution() {
        let mut config = CodeAtlasConfig::default();
        config.project_root = "/proj".into();
        assert_eq!(
            config.database_path(),
            PathBuf::from("/proj/.codeatlas/graph.db")
        );

        config.database.path = "/abs/graph.db".into();
        assert_eq!(config.database_path(), PathBuf::from("/abs/graph.db"));
    }
}
