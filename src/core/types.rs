// src/core/types.rs — Deduplication domain types

use async_trait::async_trait;
use std::time::Duration;

use crate::infra::config::{DedupConfig, ResolvedStream};
use crate::infra::errors::TipsError;

/// Produces candidate text for one stream.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self) -> Result<String, TipsError>;
}

/// Knobs for one stream's generate/check loop.
#[derive(Debug, Clone)]
pub struct DedupPolicy {
    pub similarity_threshold: f32,
    pub max_attempts: u32,
    pub empty_backoff: Duration,
    pub duplicate_backoff: Duration,
    pub timeout: Option<Duration>,
    /// Write the index to disk after each accepted add.
    pub persist: bool,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self::from_config(&DedupConfig::default())
    }
}

impl DedupPolicy {
    pub fn from_config(cfg: &DedupConfig) -> Self {
        Self {
            similarity_threshold: cfg.similarity_threshold,
            max_attempts: cfg.max_attempts.max(1),
            empty_backoff: Duration::from_millis(cfg.empty_backoff_ms),
            duplicate_backoff: Duration::from_millis(cfg.duplicate_backoff_ms),
            timeout: (cfg.timeout_seconds > 0).then(|| Duration::from_secs(cfg.timeout_seconds)),
            persist: true,
        }
    }

    /// Global defaults with the stream's threshold and attempt overrides.
    pub fn for_stream(cfg: &DedupConfig, stream: &ResolvedStream) -> Self {
        Self {
            similarity_threshold: stream.similarity_threshold,
            max_attempts: stream.max_attempts.max(1),
            ..Self::from_config(cfg)
        }
    }

    /// No waiting between attempts. Handy for tests and previews.
    pub fn without_backoff(mut self) -> Self {
        self.empty_backoff = Duration::ZERO;
        self.duplicate_backoff = Duration::ZERO;
        self
    }

    /// A best score at or above the threshold is a duplicate.
    pub fn is_duplicate(&self, score: f32) -> bool {
        score >= self.similarity_threshold
    }
}

/// What happened in one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Generator failed or returned nothing usable.
    EmptyGeneration,
    /// Too close to an existing entry.
    Duplicate { score: f32, matched_id: u64 },
    /// Novel; added to the index.
    Accepted { id: u64, best_score: Option<f32> },
    /// Embedding failed; returned without a similarity check.
    Unverified,
}

/// One ephemeral (candidate, outcome) pair.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub attempt: u32,
    pub text: Option<String>,
    pub outcome: AttemptOutcome,
}

/// A candidate rejected as a near-duplicate.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedCandidate {
    pub text: String,
    pub score: f32,
    pub matched_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Checked against the index and recorded under `id`.
    Verified {
        id: u64,
        /// Best score against the prior entries (`None` if the index was empty).
        best_score: Option<f32>,
        /// Whether the index was written to disk afterwards.
        persisted: bool,
    },
    /// Accepted without a similarity check because embedding failed.
    Unverified { reason: String },
}

/// Content that passed (or bypassed) the duplicate check.
#[derive(Debug, Clone)]
pub struct UniqueContent {
    pub text: String,
    pub verdict: Verdict,
    pub attempts: Vec<GenerationAttempt>,
}

impl UniqueContent {
    pub fn index_id(&self) -> Option<u64> {
        match self.verdict {
            Verdict::Verified { id, .. } => Some(id),
            Verdict::Unverified { .. } => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self.verdict, Verdict::Verified { .. })
    }

    /// Near-duplicates generated on the way to this result.
    pub fn rejected(&self) -> Vec<RejectedCandidate> {
        rejected_candidates(&self.attempts)
    }
}

/// The duplicate attempts in `attempts`, in order.
pub fn rejected_candidates(attempts: &[GenerationAttempt]) -> Vec<RejectedCandidate> {
    attempts
        .iter()
        .filter_map(|a| match (&a.outcome, &a.text) {
            (AttemptOutcome::Duplicate { score, matched_id }, Some(text)) => {
                Some(RejectedCandidate {
                    text: text.clone(),
                    score: *score,
                    matched_id: *matched_id,
                })
            }
            _ => None,
        })
        .collect()
}
