//! Batched embedding with count and dimension checks.

use std::sync::Arc;

use ragline_llm::{LlmError, LlmProvider};

/// Maximum inputs per provider request.
pub const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding provider failed: {0}")]
    Provider(#[from] LlmError),

    #[error("provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Turns texts into vectors of a fixed dimension through an [`LlmProvider`].
#[derive(Debug)]
pub struct Embedder<P> {
    provider: Arc<P>,
    dimension: usize,
    batch_size: usize,
}

impl<P> Clone for Embedder<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            dimension: self.dimension,
            batch_size: self.batch_size,
        }
    }
}

impl<P: LlmProvider> Embedder<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, dimension: usize) -> Self {
        Self {
            provider,
            dimension,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Embed `texts`, preserving length and order.
    ///
    /// # Errors
    ///
    /// Fails on the first provider error, or when the provider returns the wrong
    /// number of vectors or a vector of the wrong length.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embedded = self.provider.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    expected: batch.len(),
                    actual: embedded.len(),
                });
            }
            if let Some(bad) = embedded.iter().find(|v| v.len() != self.dimension) {
                return Err(EmbedError::DimensionMismatch {
                    expected: self.dimension,
                    actual: bad.len(),
                });
            }
            vectors.extend(embedded);
        }

        tracing::debug!(
            inputs = texts.len(),
            batch_size = self.batch_size,
            provider = self.provider.name(),
            "embedded texts"
        );
        Ok(vectors)
    }

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Same as [`Embedder::embed`].
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed(&[text.to_owned()]).await?;
        vectors.pop().ok_or(EmbedError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}
