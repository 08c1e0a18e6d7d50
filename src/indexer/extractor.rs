//! Extraction orchestrator.
//!
//! Full run: walk → parse (parallel) → registry build → resolve → store.
//! Incremental run: diff the walk against the hash ledger, delete data for
//! removed/modified files, reparse only added/modified files, and resolve
//! with a lazy store fallback so cross-file references into untouched files
//! still land. The orchestrator itself is single-threaded; only the parse
//! phase fans out.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config::CodeAtlasConfig;
use crate::db::GraphStore;
use crate::error::{CodeAtlasError, Result};
use crate::indexer::hashing::{hash_file, HashLedger};
use crate::indexer::walker::{walk, WalkOptions, WalkedFile};
use crate::parsers::{ParserOptions, ParserSet};
use crate::resolution::{Resolver, SymbolRegistry};
use crate::types::{Entity, ParseResult, Relationship};

/// Hard ceiling on the parse worker pool.
const MAX_PARSE_WORKERS: usize = 4;

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Exit record of an extraction run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Statistics {
    pub files_processed: usize,
    pub files_failed: usize,
    pub entities_extracted: usize,
    pub relationships_extracted: usize,
    pub errors: Vec<String>,
    // Incremental counters; zero on full runs.
    pub files_added: usize,
    pub files_modified: usize,
    pub files_removed: usize,
    pub files_unchanged: usize,
    pub entities_removed: usize,
    pub relationships_removed: usize,
    /// Wall-clock seconds for the whole run.
    pub update_time: f64,
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

pub struct Extractor<'a> {
    config: &'a CodeAtlasConfig,
    store: &'a GraphStore,
    parsers: ParserSet,
    ledger: HashLedger,
    cancel: Arc<AtomicBool>,
}

impl<'a> Extractor<'a> {
    /// Build an extractor, loading the hash ledger from the store's File
    /// entities.
    pub fn new(config: &'a CodeAtlasConfig, store: &'a GraphStore) -> Result<Self> {
        let ledger = HashLedger::from_pairs(store.file_hashes()?);
        Ok(Self {
            config,
            store,
            parsers: ParserSet::new(ParserOptions {
                include_docstrings: config.parsing.include_docstrings,
            }),
            ledger,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared cancellation flag. Setting it interrupts the run before the
    /// next store batch is dispatched; in-flight parse workers finish their
    /// current file.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(CodeAtlasError::Configuration(
                "extraction cancelled".into(),
            ));
        }
        Ok(())
    }

    fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            exclude_patterns: self.config.parsing.exclude_patterns.clone(),
            max_file_size: self.config.parsing.max_file_size,
            follow_symlinks: self.config.parsing.follow_symlinks,
        }
    }

    /// Walk the project root, keeping only files a parser exists for.
    fn discover(&self) -> Result<Vec<WalkedFile>> {
        let root = Path::new(&self.config.project_root);
        let mut files = walk(root, &self.walk_options())?;
        files.retain(|f| self.parsers.supports(f.kind));
        Ok(files)
    }

    // -- full run -----------------------------------------------------------

    /// Clear the graph and rebuild it from scratch.
    pub fn run_full(&mut self) -> Result<Statistics> {
        let start = Instant::now();
        tracing::info!("starting full extraction of {}", self.config.project_root);

        self.store.delete_all()?;
        self.ledger.clear();

        let files = self.discover()?;
        tracing::info!("found {} files to parse", files.len());

        let results = self.parse_parallel(&files);
        let registry =
            SymbolRegistry::build(&self.config.project_root, all_entities(&results));
        tracing::info!("pass 1 complete: {} symbols registered", registry.len());

        let mut resolver = Resolver::new(registry);
        let results = resolver.resolve_results(results);

        let mut stats = self.persist(results)?;
        stats.files_added = stats.files_processed;
        stats.update_time = start.elapsed().as_secs_f64();
        tracing::info!(
            "full extraction complete in {:.2}s: {} entities, {} relationships",
            stats.update_time,
            stats.entities_extracted,
            stats.relationships_extracted
        );
        Ok(stats)
    }

    // -- incremental run ----------------------------------------------------

    /// Reparse only files whose content hash changed; delete data for
    /// removed files. Returns with zero work when nothing changed.
    pub fn run_incremental(&mut self) -> Result<Statistics> {
        let start = Instant::now();
        tracing::info!(
            "starting incremental update of {}",
            self.config.project_root
        );

        let files = self.discover()?;
        let mut current: Vec<(String, String)> = Vec::new();
        let mut unhashable: HashSet<String> = HashSet::new();
        let mut stats = Statistics::default();
        for file in &files {
            let path = file.path.to_string_lossy().into_owned();
            match hash_file(&file.path) {
                Ok(hash) => current.push((path, hash)),
                Err(e) => {
                    tracing::warn!("cannot hash {path}: {e}");
                    stats.errors.push(format!("{path}: {e}"));
                    unhashable.insert(path);
                }
            }
        }

        let mut changes = self.ledger.diff(&current);
        // An unreadable file keeps its prior ledger entry; it is neither
        // reparsed nor deleted.
        changes.removed.retain(|path| !unhashable.contains(path));
        stats.files_added = changes.added.len();
        stats.files_modified = changes.modified.len();
        stats.files_removed = changes.removed.len();
        stats.files_unchanged = changes.unchanged.len();

        if changes.is_empty() {
            stats.update_time = start.elapsed().as_secs_f64();
            tracing::info!("no changes detected");
            return Ok(stats);
        }
        tracing::info!(
            "changes: {} added, {} modified, {} removed, {} unchanged",
            stats.files_added,
            stats.files_modified,
            stats.files_removed,
            stats.files_unchanged
        );

        // Deletions first: removed files entirely, modified files so their
        // entity sets can be re-inserted.
        for path in changes.removed.iter().chain(changes.modified.iter()) {
            self.check_cancelled()?;
            let (entities, relationships) = self.store.delete_entities_for_file(path)?;
            stats.entities_removed += entities;
            stats.relationships_removed += relationships;
        }
        for path in &changes.removed {
            self.ledger.forget(path);
        }

        let to_parse: HashSet<String> = changes.to_parse().into_iter().collect();
        let reparse: Vec<WalkedFile> = files
            .into_iter()
            .filter(|f| to_parse.contains(&f.path.to_string_lossy().into_owned()))
            .collect();

        let results = self.parse_parallel(&reparse);
        let registry =
            SymbolRegistry::build(&self.config.project_root, all_entities(&results));
        let mut resolver = Resolver::with_fallback(registry, self.store);
        let results = resolver.resolve_results(results);

        let persisted = self.persist(results)?;
        stats.files_processed = persisted.files_processed;
        stats.files_failed = persisted.files_failed;
        stats.entities_extracted = persisted.entities_extracted;
        stats.relationships_extracted = persisted.relationships_extracted;
        stats.errors.extend(persisted.errors);
        stats.update_time = start.elapsed().as_secs_f64();
        tracing::info!("incremental update complete in {:.2}s", stats.update_time);
        Ok(stats)
    }

    // -- parsing ------------------------------------------------------------

    /// Parse files on a bounded worker pool. Each file is independent; the
    /// pool size is `min(4, files)`.
    fn parse_parallel(&self, files: &[WalkedFile]) -> Vec<ParseResult> {
        use rayon::prelude::*;

        if files.is_empty() {
            return Vec::new();
        }
        let workers = MAX_PARSE_WORKERS.min(files.len()).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build();
        // Workers share nothing but the parser table; the store stays on
        // the orchestrator thread.
        let parsers = &self.parsers;
        let parse_all = || {
            files
                .par_iter()
                .filter_map(|file| parsers.parse_file(&file.path, file.kind))
                .collect::<Vec<ParseResult>>()
        };
        let mut results = match pool {
            Ok(pool) => pool.install(parse_all),
            Err(e) => {
                tracing::warn!("thread pool unavailable ({e}); parsing sequentially");
                files
                    .iter()
                    .filter_map(|file| parsers.parse_file(&file.path, file.kind))
                    .collect()
            }
        };
        // Parallel completion order is nondeterministic; restore walk order.
        results.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        results
    }

    // -- persistence --------------------------------------------------------

    /// De-duplicate entities by id (first writer wins), then write entities
    /// before relationships so every edge sees its endpoints.
    fn persist(&mut self, results: Vec<ParseResult>) -> Result<Statistics> {
        let mut stats = Statistics::default();
        let mut entities: Vec<Entity> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut relationships: Vec<Relationship> = Vec::new();

        for result in &results {
            if result.errors.is_empty() {
                stats.files_processed += 1;
            } else {
                stats.files_failed += 1;
                stats.errors.extend(result.errors.iter().cloned());
            }
            for entity in &result.entities {
                if seen.insert(entity.id.clone()) {
                    entities.push(entity.clone());
                }
            }
            relationships.extend(result.relationships.iter().cloned());
            if !result.file_hash.is_empty() {
                self.ledger
                    .record(result.file_path.clone(), result.file_hash.clone());
            }
        }

        stats.entities_extracted = entities.len();
        stats.relationships_extracted = relationships.len();

        let batch_size = self.config.database.batch_size.max(1);
        for chunk in entities.chunks(batch_size) {
            self.check_cancelled()?;
            let outcome = self.store.upsert_entities(chunk)?;
            report_outcome(&mut stats, outcome);
        }
        for chunk in relationships.chunks(batch_size) {
            self.check_cancelled()?;
            let outcome = self.store.insert_relationships(chunk)?;
            report_outcome(&mut stats, outcome);
        }
        Ok(stats)
    }
}

fn report_outcome(stats: &mut Statistics, outcome: crate::db::BatchOutcome) {
    for warning in &outcome.warnings {
        tracing::debug!("{warning}");
    }
    if outcome.failed > 0 {
        stats
            .errors
            .push(format!("{} rows failed to persist", outcome.failed));
    }
}

fn all_entities<'r>(
    results: &'r [ParseResult],
) -> impl Iterator<Item = &'r Entity> + Clone {
    results.iter().flat_map(|r| r.entities.iter())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
