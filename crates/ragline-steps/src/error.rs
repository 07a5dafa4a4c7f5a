use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("step store lock poisoned")]
    Poisoned,
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

/// Classifies whether an attempt that failed with this error may be repeated.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Outcome of a step that did not produce a value.
#[derive(Debug, Error)]
pub enum StepError<E> {
    #[error("step `{step}` failed after {attempts} attempt(s): {source}")]
    Failed {
        step: String,
        attempts: u32,
        #[source]
        source: E,
    },
    #[error("step `{step}` timed out after {attempts} attempt(s)")]
    TimedOut { step: String, attempts: u32 },
    #[error("step store error: {0}")]
    Store(#[from] StepStoreError),
    #[error("cannot encode or decode output of step `{step}`: {source}")]
    Codec {
        step: String,
        #[source]
        source: serde_json::Error,
    },
}

impl<E> StepError<E> {
    /// Name of the step that failed, when known.
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Failed { step, .. } | Self::TimedOut { step, .. } | Self::Codec { step, .. } => {
                Some(step)
            }
            Self::Store(_) => None,
        }
    }

    /// The step's own error, if the step body failed.
    #[must_use]
    pub fn source_error(&self) -> Option<&E> {
        match self {
            Self::Failed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn failed_names_step() {
        let err: StepError<Boom> = StepError::Failed {
            step: "embed-and-upsert".into(),
            attempts: 3,
            source: Boom,
        };
        assert_eq!(err.step(), Some("embed-and-upsert"));
        assert!(err.source_error().is_some());
        assert_eq!(
            err.to_string(),
            "step `embed-and-upsert` failed after 3 attempt(s): boom"
        );
    }

    #[test]
    fn store_error_has_no_step() {
        let err: StepError<Boom> = StepStoreError::Poisoned.into();
        assert_eq!(err.step(), None);
        assert!(err.source_error().is_none());
    }
}
