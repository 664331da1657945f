// src/memory/embeddings.rs — Vector operations + embedding service

use std::sync::Arc;
use std::sync::OnceLock;

use crate::infra::errors::EmbeddingError;
use crate::provider::ModelProvider;

/// Text used to discover the provider's embedding dimension.
const DIMENSION_PROBE: &str = "dimension probe";

/// Inner product of two equal-length vectors. For unit vectors this is the
/// cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot(a, b) / (norm_a * norm_b)
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalize a vector to unit length. Zero vectors are left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Validate a raw provider vector and return it L2-normalized.
pub fn normalized(mut raw: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
    if raw.is_empty() {
        return Err(EmbeddingError::Empty);
    }
    if raw.iter().any(|x| !x.is_finite()) {
        return Err(EmbeddingError::NonFinite);
    }
    let norm = l2_norm(&raw);
    if norm == 0.0 || !norm.is_finite() {
        return Err(EmbeddingError::ZeroNorm);
    }
    normalize(&mut raw);
    Ok(raw)
}

/// Turns text into unit-length embeddings of a fixed dimension.
///
/// The dimension is pinned by the first successful call, which is the
/// probe made by [`EmbeddingService::dimension`]. Any later vector of a
/// different length is rejected. A configured dimension is only an
/// expectation: the provider's answer wins.
pub struct EmbeddingService {
    provider: Arc<dyn ModelProvider>,
    model: String,
    configured: Option<usize>,
    dimension: OnceLock<usize>,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            configured: None,
            dimension: OnceLock::new(),
        }
    }

    /// Expected dimension, checked against the provider's first vector.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.configured = Some(dimension);
        self
    }

    pub fn configured_dimension(&self) -> Option<usize> {
        self.configured
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The fixed dimension, probing the provider once if it is not known yet.
    ///
    /// A failed request is an error even when a dimension was configured.
    pub async fn dimension(&self) -> Result<usize, EmbeddingError> {
        if let Some(d) = self.dimension.get() {
            return Ok(*d);
        }
        let actual = self.embed(DIMENSION_PROBE).await?.len();
        if let Some(configured) = self.configured.filter(|c| *c != actual) {
            tracing::warn!(
                model = %self.model,
                "Configured embedding dimension {} does not match the provider's {}. Using {}",
                configured,
                actual,
                actual
            );
        }
        Ok(actual)
    }

    pub fn known_dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self
            .provider
            .embed(&self.model, &[text])
            .await
            .map_err(EmbeddingError::Provider)?;

        if vectors.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        let vector = normalized(vectors.swap_remove(0))?;

        let expected = *self.dimension.get_or_init(|| vector.len());
        if vector.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                got: vector.len(),
            });
        }

        tracing::trace!(model = %self.model, dim = expected, "Embedded {} chars", text.len());
        Ok(vector)
    }
}
