// src/core/mod.rs — Deduplication engine

pub mod coordinator;
pub mod types;

pub use coordinator::StreamDeduplicator;
pub use types::{ContentGenerator, DedupPolicy, UniqueContent, Verdict};
