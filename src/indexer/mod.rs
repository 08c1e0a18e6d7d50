//! Extraction pipeline: discovery, change detection, and orchestration.

pub mod classifier;
pub mod extractor;
pub mod hashing;
pub mod walker;

pub use extractor::{Extractor, Statistics};
pub use hashing::{ChangeSet, HashLedger};
pub use walker::{WalkOptions, WalkedFile};
