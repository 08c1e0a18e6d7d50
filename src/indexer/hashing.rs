//! Content hashing and the per-file hash ledger.
//!
//! The ledger maps file paths to hex SHA-256 content hashes. It is loaded at
//! startup from the persisted File entities (the `hash` attribute is the
//! source of truth) and diffed against the current walk to partition files
//! into added/modified/removed/unchanged sets.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Result;

/// Hex SHA-256 of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of a file's raw bytes.
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

// ---------------------------------------------------------------------------
// ChangeSet
// ---------------------------------------------------------------------------

/// Partition of the current walk against the previous ledger.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ChangeSet {
    /// Whether there is any work to do.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Files that need reparsing (added ∪ modified), in walk order.
    pub fn to_parse(&self) -> Vec<String> {
        let mut files = self.added.clone();
        files.extend(self.modified.iter().cloned());
        files
    }
}

// ---------------------------------------------------------------------------
// HashLedger
// ---------------------------------------------------------------------------

/// In-memory `file_path → content_hash` map for change detection.
#[derive(Debug, Default, Clone)]
pub struct HashLedger {
    hashes: HashMap<String, String>,
}

impl HashLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from persisted `(path, hash)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            hashes: pairs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.hashes.get(path).map(String::as_str)
    }

    pub fn record(&mut self, path: impl Into<String>, hash: impl Into<String>) {
        self.hashes.insert(path.into(), hash.into());
    }

    pub fn forget(&mut self, path: &str) {
        self.hashes.remove(path);
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
    }

    /// Diff the current walk (path → hash, in walk order) against the
    /// ledger. Files present in the ledger but absent from the walk are
    /// `removed`; removal ordering is lexical for determinism.
    pub fn diff(&self, current: &[(String, String)]) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let mut seen: BTreeMap<&str, ()> = BTreeMap::new();

        for (path, hash) in current {
            seen.insert(path.as_str(), ());
            match self.hashes.get(path) {
                None => changes.added.push(path.clone()),
                Some(previous) if previous != hash => changes.modified.push(path.clone()),
                Some(_) => changes.unchanged.push(path.clone()),
            }
        }

        let mut removed: Vec<String> = self
            .hashes
            .keys()
            .filter(|path| !seen.contains_key(path.as_str()))
            .cloned()
            .collect();
        removed.sort();
        changes.removed = removed;

        changes
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
