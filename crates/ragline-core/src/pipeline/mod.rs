//! Durable ingestion and query pipelines.
//!
//! Each pipeline is a fixed sequence of named steps run through a
//! [`StepRunner`](ragline_steps::StepRunner). A step's output is recorded under
//! `(job_id, step)` before the next step starts, so re-running a job with the same
//! id resumes after the last completed step.

pub mod ingest;
pub mod prompt;
pub mod query;

pub use ingest::{ChunksAndSource, IngestionPipeline, PruneOutcome, UpsertOutcome};
pub use query::{QueryPipeline, RetrievedContext, SearchOutcome};

use ragline_llm::LlmError;
use ragline_memory::document::DocumentError;
use ragline_memory::{EmbedError, VectorStoreError};
use ragline_steps::{Retryable, StepError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("text extraction failed: {0}")]
    Extraction(#[from] DocumentError),

    #[error("embedding provider failed: {0}")]
    EmbeddingProvider(#[source] LlmError),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector store failed: {0}")]
    VectorStore(#[source] VectorStoreError),

    #[error("generation provider failed: {0}")]
    GenerationProvider(#[source] LlmError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failure of a whole pipeline job, always naming the step when one failed.
pub type JobError = StepError<PipelineError>;

impl PipelineError {
    /// Whether the failure came from the embedding or generation provider.
    #[must_use]
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingProvider(_) | Self::GenerationProvider(_)
        )
    }
}

impl Retryable for PipelineError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::EmbeddingProvider(e) | Self::GenerationProvider(e) => e.is_transient(),
            Self::VectorStore(e) => e.is_retryable(),
            Self::Extraction(_) | Self::DimensionMismatch { .. } | Self::InvalidConfig(_) => false,
        }
    }
}

impl From<EmbedError> for PipelineError {
    fn from(e: EmbedError) -> Self {
        match e {
            EmbedError::Provider(inner) => Self::EmbeddingProvider(inner),
            EmbedError::CountMismatch { expected, actual } => Self::EmbeddingProvider(
                LlmError::Other(format!("provider returned {actual} vectors for {expected} inputs")),
            ),
            EmbedError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
        }
    }
}

impl From<VectorStoreError> for PipelineError {
    fn from(e: VectorStoreError) -> Self {
        match e {
            VectorStoreError::DimensionMismatch { expected, actual } => Self::DimensionMismatch {
                expected: usize::try_from(expected).unwrap_or(usize::MAX),
                actual: usize::try_from(actual).unwrap_or(usize::MAX),
            },
            other => Self::VectorStore(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_retryable() {
        let e = PipelineError::EmbeddingProvider(LlmError::RateLimited);
        assert!(e.is_retryable());
        let e = PipelineError::GenerationProvider(LlmError::Api {
            provider: "openai",
            status: 503,
        });
        assert!(e.is_retryable());
        let e = PipelineError::from(VectorStoreError::Connection("refused".into()));
        assert!(e.is_retryable());
    }

    #[test]
    fn permanent_failures_are_not_retryable() {
        let e = PipelineError::from(DocumentError::UnsupportedFormat("txt".into()));
        assert!(!e.is_retryable());
        let e = PipelineError::EmbeddingProvider(LlmError::Unauthorized { provider: "openai" });
        assert!(!e.is_retryable());
        let e = PipelineError::InvalidConfig("bad".into());
        assert!(!e.is_retryable());
        let e = PipelineError::from(VectorStoreError::InvalidArgument("limit".into()));
        assert!(!e.is_retryable());
        let e = PipelineError::EmbeddingProvider(LlmError::Api {
            provider: "openai",
            status: 400,
        });
        assert!(!e.is_retryable());
        let e = PipelineError::GenerationProvider(LlmError::Api {
            provider: "openai",
            status: 404,
        });
        assert!(!e.is_retryable());
    }

    #[test]
    fn dimension_errors_map_to_dimension_variant() {
        let e = PipelineError::from(VectorStoreError::DimensionMismatch {
            expected: 1536,
            actual: 8,
        });
        assert!(matches!(
            e,
            PipelineError::DimensionMismatch {
                expected: 1536,
                actual: 8
            }
        ));
        assert!(!e.is_retryable());

        let e = PipelineError::from(EmbedError::DimensionMismatch {
            expected: 4,
            actual: 3,
        });
        assert!(matches!(e, PipelineError::DimensionMismatch { .. }));
    }

    #[test]
    fn provider_errors_are_flagged() {
        assert!(PipelineError::from(EmbedError::Provider(LlmError::RateLimited)).is_provider());
        assert!(!PipelineError::InvalidConfig("x".into()).is_provider());
    }
}
