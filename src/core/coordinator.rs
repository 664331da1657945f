// src/core/coordinator.rs — Per-stream generate → embed → check → accept loop

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::types::{
    rejected_candidates, AttemptOutcome, ContentGenerator, DedupPolicy, GenerationAttempt,
    UniqueContent, Verdict,
};
use crate::infra::errors::{DedupError, EmbeddingError};
use crate::memory::embeddings::EmbeddingService;
use crate::memory::index::VectorIndex;
use crate::util::truncate_str;

/// Owns one stream's vector index and serializes access to it.
///
/// Every call to [`StreamDeduplicator::get_unique_content`] holds the index
/// lock from the first generation until it returns, so search, add and save
/// never interleave between concurrent callers on the same stream.
pub struct StreamDeduplicator {
    stream: String,
    index_path: PathBuf,
    embedder: Arc<EmbeddingService>,
    policy: DedupPolicy,
    index: Mutex<VectorIndex>,
}

impl StreamDeduplicator {
    /// Load the stream's index from `index_path`, sized to the embedder's
    /// dimension. Fails only if the dimension cannot be determined.
    pub async fn open(
        stream: impl Into<String>,
        index_path: impl Into<PathBuf>,
        embedder: Arc<EmbeddingService>,
        policy: DedupPolicy,
    ) -> Result<Self, EmbeddingError> {
        let index_path = index_path.into();
        let dim = embedder.dimension().await?;
        let index = VectorIndex::load(&index_path, dim);
        Ok(Self::with_index(stream, index_path, embedder, policy, index))
    }

    pub fn with_index(
        stream: impl Into<String>,
        index_path: impl Into<PathBuf>,
        embedder: Arc<EmbeddingService>,
        policy: DedupPolicy,
        index: VectorIndex,
    ) -> Self {
        let stream = stream.into();
        tracing::info!(
            stream = %stream,
            entries = index.len(),
            threshold = policy.similarity_threshold,
            "Deduplicator ready"
        );
        Self {
            stream,
            index_path: index_path.into(),
            embedder,
            policy,
            index: Mutex::new(index),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn policy(&self) -> &DedupPolicy {
        &self.policy
    }

    pub async fn index_len(&self) -> usize {
        self.index.lock().await.len()
    }

    /// Generate content that is not a near-duplicate of anything this stream
    /// has accepted before, recording it in the index.
    ///
    /// If embedding fails the candidate is returned unverified and the index
    /// is left alone. Running out of attempts, or the end-to-end timeout,
    /// is an error.
    pub async fn get_unique_content(
        &self,
        generator: &dyn ContentGenerator,
    ) -> Result<UniqueContent, DedupError> {
        match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(generator))
                .await
                .map_err(|_| {
                    tracing::error!(stream = %self.stream, "Deduplication timed out after {:?}", limit);
                    DedupError::Timeout {
                        seconds: limit.as_secs(),
                    }
                })?,
            None => self.run(generator).await,
        }
    }

    async fn run(&self, generator: &dyn ContentGenerator) -> Result<UniqueContent, DedupError> {
        let mut index = self.index.lock().await;
        let max = self.policy.max_attempts;
        let mut attempts = Vec::with_capacity(max as usize);

        for attempt in 1..=max {
            tracing::info!(stream = %self.stream, "Attempt {}/{} to generate a unique tip", attempt, max);

            // Generating
            let text = match generator.generate().await {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                Ok(_) => {
                    tracing::warn!(stream = %self.stream, "Generator returned empty content");
                    attempts.push(GenerationAttempt {
                        attempt,
                        text: None,
                        outcome: AttemptOutcome::EmptyGeneration,
                    });
                    self.backoff(attempt, self.policy.empty_backoff).await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(stream = %self.stream, "Failed to generate content: {}", e);
                    attempts.push(GenerationAttempt {
                        attempt,
                        text: None,
                        outcome: AttemptOutcome::EmptyGeneration,
                    });
                    self.backoff(attempt, self.policy.empty_backoff).await;
                    continue;
                }
            };

            // Embedding
            let embedding = match self.embedder.embed(&text).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        stream = %self.stream,
                        "Embedding failed ({}). Returning tip without similarity check",
                        e
                    );
                    attempts.push(GenerationAttempt {
                        attempt,
                        text: Some(text.clone()),
                        outcome: AttemptOutcome::Unverified,
                    });
                    return Ok(UniqueContent {
                        text,
                        verdict: Verdict::Unverified {
                            reason: e.to_string(),
                        },
                        attempts,
                    });
                }
            };

            // Checking
            let best = index.search_nearest(&embedding)?;
            if let Some(m) = best {
                tracing::debug!(stream = %self.stream, "Highest similarity score: {:.4} (id {})", m.score, m.id);
                if self.policy.is_duplicate(m.score) {
                    tracing::warn!(
                        stream = %self.stream,
                        "Similarity {:.4} >= threshold {}. Duplicate of #{}: {}",
                        m.score,
                        self.policy.similarity_threshold,
                        m.id,
                        truncate_str(&text, 60)
                    );
                    attempts.push(GenerationAttempt {
                        attempt,
                        text: Some(text),
                        outcome: AttemptOutcome::Duplicate {
                            score: m.score,
                            matched_id: m.id,
                        },
                    });
                    self.backoff(attempt, self.policy.duplicate_backoff).await;
                    continue;
                }
            }

            // Accept
            let best_score = best.map(|m| m.score);
            let id = index.add(&embedding)?;
            let persisted = self.policy.persist && self.persist(&index).await;
            tracing::info!(
                stream = %self.stream,
                "Tip is unique. Added as #{} (index size {})",
                id,
                index.len()
            );
            attempts.push(GenerationAttempt {
                attempt,
                text: Some(text.clone()),
                outcome: AttemptOutcome::Accepted { id, best_score },
            });
            return Ok(UniqueContent {
                text,
                verdict: Verdict::Verified {
                    id,
                    best_score,
                    persisted,
                },
                attempts,
            });
        }

        tracing::error!(stream = %self.stream, "Failed to find a unique tip after {} attempts", max);
        Err(DedupError::GenerationExhausted {
            attempts: max,
            rejected: rejected_candidates(&attempts),
        })
    }

    /// Write a snapshot of the index on the blocking pool so fsync never
    /// stalls other streams. Save failures are logged; the acceptance
    /// already happened.
    async fn persist(&self, index: &VectorIndex) -> bool {
        let snapshot = index.clone();
        let path = self.index_path.clone();
        let saved = tokio::task::spawn_blocking(move || snapshot.save(&path)).await;
        match saved {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(
                    stream = %self.stream,
                    path = %self.index_path.display(),
                    "Error saving index: {}",
                    e
                );
                false
            }
            Err(e) => {
                tracing::error!(stream = %self.stream, "Index save task failed: {}", e);
                false
            }
        }
    }

    /// Wait between attempts, but not after the last one.
    async fn backoff(&self, attempt: u32, delay: std::time::Duration) {
        if attempt < self.policy.max_attempts && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
