//! CodeAtlas — incremental multi-language code graph extraction.
//!
//! Ingests a source tree (Python, TypeScript/JavaScript with Angular
//! awareness, HTML, CSS) and produces a persisted, queryable graph of typed
//! entities and relationships, refreshed incrementally by content-hash
//! change detection.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod indexer;
pub mod observability;
pub mod parsers;
pub mod resolution;
pub mod types;
