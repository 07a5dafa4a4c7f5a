//! Trigger payloads accepted by the pipelines, and the results they return.
//!
//! Requests are deserialized as-is and then checked by `validate`, which turns
//! them into fully-resolved jobs. Nothing downstream sees an unvalidated request.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Fresh job identifier for requests that do not carry one.
#[must_use]
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn optional_id(field: &'static str, value: Option<String>) -> Result<Option<String>, RequestError> {
    match value {
        Some(v) if v.trim().is_empty() => Err(RequestError::InvalidField {
            field,
            reason: "must not be blank when given".into(),
        }),
        other => Ok(other),
    }
}

/// "New document available" trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub pdf_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl IngestRequest {
    #[must_use]
    pub fn new(pdf_path: impl Into<String>) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Resolve defaults: `source_id` falls back to `pdf_path` as given, `job_id`
    /// to a random v4 uuid.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] if `pdf_path` is missing or an optional id is blank.
    pub fn validate(self) -> Result<IngestJob, RequestError> {
        if self.pdf_path.trim().is_empty() {
            return Err(RequestError::MissingField("pdf_path"));
        }
        let source_id = optional_id("source_id", self.source_id)?
            .unwrap_or_else(|| self.pdf_path.clone());
        let job_id = optional_id("job_id", self.job_id)?.unwrap_or_else(new_job_id);
        Ok(IngestJob {
            job_id,
            pdf_path: PathBuf::from(self.pdf_path),
            source_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestJob {
    pub job_id: String,
    pub pdf_path: PathBuf,
    pub source_id: String,
}

/// "Question asked" trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl QueryRequest {
    #[must_use]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// # Errors
    ///
    /// Returns [`RequestError`] for a blank question, `top_k == 0`, or a blank `job_id`.
    pub fn validate(self) -> Result<QueryJob, RequestError> {
        if self.question.trim().is_empty() {
            return Err(RequestError::MissingField("question"));
        }
        if self.top_k == Some(0) {
            return Err(RequestError::InvalidField {
                field: "top_k",
                reason: "must be at least 1".into(),
            });
        }
        let job_id = optional_id("job_id", self.job_id)?.unwrap_or_else(new_job_id);
        Ok(QueryJob {
            job_id,
            question: self.question,
            top_k: self.top_k,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryJob {
    pub job_id: String,
    pub question: String,
    /// `None` uses the pipeline's configured default.
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IngestResult {
    pub ingested: usize,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    /// Unique source ids in order of first appearance among the contexts.
    pub sources: Vec<String>,
    pub num_contexts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_source_id_defaults_to_path() {
        let job = IngestRequest::new("docs/report.pdf").validate().unwrap();
        assert_eq!(job.source_id, "docs/report.pdf");
        assert_eq!(job.pdf_path, PathBuf::from("docs/report.pdf"));
        assert!(uuid::Uuid::parse_str(&job.job_id).is_ok());
    }

    #[test]
    fn ingest_explicit_ids_are_kept() {
        let job = IngestRequest::new("a.pdf")
            .with_source_id("doc1")
            .with_job_id("job-1")
            .validate()
            .unwrap();
        assert_eq!(job.source_id, "doc1");
        assert_eq!(job.job_id, "job-1");
    }

    #[test]
    fn ingest_requires_path() {
        assert_eq!(
            IngestRequest::new("  ").validate().unwrap_err(),
            RequestError::MissingField("pdf_path")
        );
    }

    #[test]
    fn blank_source_id_is_rejected() {
        let err = IngestRequest::new("a.pdf")
            .with_source_id(" ")
            .validate()
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidField { field: "source_id", .. }));
    }

    #[test]
    fn ingest_request_from_json() {
        let req: IngestRequest =
            serde_json::from_str(r#"{"pdf_path": "x.pdf", "source_id": "doc9"}"#).unwrap();
        assert_eq!(req.source_id.as_deref(), Some("doc9"));
        assert!(req.job_id.is_none());

        let empty: IngestRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn query_validation() {
        assert_eq!(
            QueryRequest::new("\n").validate().unwrap_err(),
            RequestError::MissingField("question")
        );
        assert!(matches!(
            QueryRequest::new("why?").with_top_k(0).validate(),
            Err(RequestError::InvalidField { field: "top_k", .. })
        ));
        let job = QueryRequest::new("why?").with_top_k(2).validate().unwrap();
        assert_eq!(job.top_k, Some(2));
        assert_eq!(job.question, "why?");
    }

    #[test]
    fn query_request_rejects_negative_top_k_at_parse() {
        let parsed: Result<QueryRequest, _> =
            serde_json::from_str(r#"{"question": "q", "top_k": -3}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn generated_job_ids_are_unique() {
        assert_ne!(new_job_id(), new_job_id());
    }

    proptest::proptest! {
        #[test]
        fn non_blank_ids_are_preserved(
            path in "[a-z/]{1,20}\\.pdf",
            source in "[ -~]*[!-~][ -~]*",
            job in "[a-zA-Z0-9-]{1,36}",
        ) {
            let parsed = IngestRequest::new(path.clone())
                .with_source_id(source.clone())
                .with_job_id(job.clone())
                .validate()
                .unwrap();
            proptest::prop_assert_eq!(parsed.source_id, source);
            proptest::prop_assert_eq!(parsed.job_id, job);
            proptest::prop_assert_eq!(parsed.pdf_path, PathBuf::from(path));
        }

        #[test]
        fn positive_top_k_is_kept(top_k in 1usize..10_000) {
            let job = QueryRequest::new("q").with_top_k(top_k).validate().unwrap();
            proptest::prop_assert_eq!(job.top_k, Some(top_k));
        }
    }
}
