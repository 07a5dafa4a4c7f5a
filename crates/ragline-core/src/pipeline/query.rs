use std::sync::Arc;

use ragline_llm::{GenerationOptions, LlmError, LlmProvider};
use ragline_memory::vector_store::{SOURCE_FIELD, TEXT_FIELD};
use ragline_memory::{Embedder, ScoredVectorPoint, VectorStore};
use ragline_steps::StepRunner;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::{JobError, PipelineError, prompt};
use crate::events::{QueryAnswer, QueryJob};

pub const EMBED_AND_SEARCH: &str = "embed-and-search";
pub const LLM_ANSWER: &str = "llm-answer";

pub const JOB_KIND: &str = "query";

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub text: String,
    pub source: String,
    pub score: f32,
}

impl RetrievedContext {
    /// Points without a text payload carry nothing to answer from and yield `None`.
    fn from_point(point: ScoredVectorPoint) -> Option<Self> {
        let text = point.payload.get(TEXT_FIELD)?.as_str()?.to_owned();
        let source = point
            .payload
            .get(SOURCE_FIELD)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned();
        Some(Self {
            text,
            source,
            score: point.score,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub contexts: Vec<RetrievedContext>,
}

/// Unique sources in order of first appearance.
#[must_use]
pub fn unique_sources(contexts: &[RetrievedContext]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for ctx in contexts {
        if !sources.iter().any(|s| s == &ctx.source) {
            sources.push(ctx.source.clone());
        }
    }
    sources
}

/// Embed a question, retrieve the nearest chunks and generate a grounded answer.
pub struct QueryPipeline<P> {
    embedder: Embedder<P>,
    store: Arc<dyn VectorStore>,
    collection: String,
    runner: StepRunner,
    default_top_k: usize,
    generation: GenerationOptions,
}

impl<P> std::fmt::Debug for QueryPipeline<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPipeline")
            .field("collection", &self.collection)
            .field("default_top_k", &self.default_top_k)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> QueryPipeline<P> {
    /// The embedder's provider also serves chat completions.
    #[must_use]
    pub fn new(
        embedder: Embedder<P>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        runner: StepRunner,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
            runner,
            default_top_k: DEFAULT_TOP_K,
            generation: GenerationOptions::default(),
        }
    }

    #[must_use]
    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k.max(1);
        self
    }

    #[must_use]
    pub fn with_generation(mut self, generation: GenerationOptions) -> Self {
        self.generation = generation;
        self
    }

    #[must_use]
    pub fn runner(&self) -> &StepRunner {
        &self.runner
    }

    /// Answer `job.question` from the indexed chunks.
    ///
    /// An empty or missing collection is not an error: generation still runs with
    /// an explicitly empty context block.
    ///
    /// # Errors
    ///
    /// Returns a [`JobError`] naming the step that failed.
    pub async fn answer(&self, job: &QueryJob) -> Result<QueryAnswer, JobError> {
        let span = tracing::info_span!("query", job_id = %job.job_id);
        let job_id = job.job_id.as_str();
        let question = job.question.as_str();
        let top_k = job.top_k.unwrap_or(self.default_top_k);
        let runner = &self.runner;

        let steps = async move {
            let searched: SearchOutcome = runner
                .run_step(job_id, EMBED_AND_SEARCH, move || {
                    self.embed_and_search(question, top_k)
                })
                .await?;

            let contexts = searched.contexts.as_slice();
            let answer: String = runner
                .run_step(job_id, LLM_ANSWER, move || self.generate(question, contexts))
                .await?;

            tracing::info!(num_contexts = contexts.len(), "query answered");
            Ok::<_, JobError>(QueryAnswer {
                answer,
                sources: unique_sources(contexts),
                num_contexts: contexts.len(),
            })
        };

        runner
            .track_job(job_id, JOB_KIND, steps)
            .instrument(span)
            .await
    }

    async fn embed_and_search(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<SearchOutcome, PipelineError> {
        let vector = self.embedder.embed_one(question).await?;

        if !self.store.collection_exists(&self.collection).await? {
            tracing::info!(collection = %self.collection, "collection does not exist yet");
            return Ok(SearchOutcome {
                contexts: Vec::new(),
            });
        }

        let hits = self
            .store
            .search(&self.collection, vector, top_k as u64, None)
            .await?;
        let contexts: Vec<RetrievedContext> = hits
            .into_iter()
            .filter_map(RetrievedContext::from_point)
            .collect();
        tracing::info!(top_k, hits = contexts.len(), "contexts retrieved");
        Ok(SearchOutcome { contexts })
    }

    async fn generate(
        &self,
        question: &str,
        contexts: &[RetrievedContext],
    ) -> Result<String, PipelineError> {
        let messages = prompt::build_messages(question, contexts);
        let answer = self
            .embedder
            .provider()
            .chat(&messages, &self.generation)
            .await
            .map_err(PipelineError::GenerationProvider)?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(PipelineError::GenerationProvider(LlmError::Other(
                "model returned a blank answer".into(),
            )));
        }
        Ok(answer.to_owned())
    }
}
