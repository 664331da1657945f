// src/infra/errors.rs — Error types for tipstream

use thiserror::Error;

use crate::core::types::RejectedCandidate;

#[derive(Error, Debug)]
pub enum TipsError {
    // Provider errors (retriable)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    // Generation
    #[error("Generator for stream '{stream}' returned empty content")]
    EmptyGeneration { stream: String },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    // User errors
    #[error("Unknown stream '{name}'. Configured streams: {known}")]
    UnknownStream { name: String, known: String },

    #[error("Environment variable '{0}' is not set")]
    MissingEnv(String),

    // Infra
    #[error("Delivery to '{target}' failed: {message}")]
    Delivery { target: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TipsError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TipsError::Provider {
                retriable: true,
                ..
            } | TipsError::RateLimited { .. }
        )
    }
}

/// Failure to turn text into a usable embedding.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding provider failed: {0}")]
    Provider(#[source] TipsError),

    #[error("Embedding provider returned no vector")]
    Empty,

    #[error("Embedding contains non-finite values")]
    NonFinite,

    #[error("Embedding has zero norm and cannot be normalized")]
    ZeroNorm,

    #[error("Embedding dimension changed: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Errors raised by the in-memory vector index and its backing file.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Vector dimension mismatch: index has {expected}, vector has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Index file is corrupt: {0}")]
    Corrupt(String),

    #[error("Index file has dimension {found}, expected {expected}")]
    IncompatibleDimension { expected: usize, found: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal failures of a deduplicated generation call.
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("No unique content after {attempts} attempt(s)")]
    GenerationExhausted {
        attempts: u32,
        /// Near-duplicates generated along the way, oldest first.
        rejected: Vec<RejectedCandidate>,
    },

    #[error("Deduplication timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Index rejected vector: {0}")]
    Index(#[from] IndexError),
}
