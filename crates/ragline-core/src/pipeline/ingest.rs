use std::sync::Arc;

use ragline_llm::LlmProvider;
use ragline_memory::document::identity::chunk_ids;
use ragline_memory::document::{DocumentLoader, TextSplitter, concat_pages};
use ragline_memory::vector_store::{chunk_payload, points_from_parts};
use ragline_memory::{Embedder, VectorFilter, VectorStore};
use ragline_steps::StepRunner;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::{JobError, PipelineError};
use crate::events::{IngestJob, IngestResult};

pub const LOAD_AND_CHUNK: &str = "load-and-chunk";
pub const EMBED_AND_UPSERT: &str = "embed-and-upsert";
pub const PRUNE_STALE: &str = "prune-stale";

pub const JOB_KIND: &str = "ingest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunksAndSource {
    pub chunks: Vec<String>,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub ingested: usize,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneOutcome {
    pub source_id: String,
    pub kept: usize,
}

/// Load a PDF, chunk it, embed the chunks and upsert them under deterministic ids.
pub struct IngestionPipeline<P> {
    loader: Arc<dyn DocumentLoader>,
    splitter: TextSplitter,
    embedder: Embedder<P>,
    store: Arc<dyn VectorStore>,
    collection: String,
    runner: StepRunner,
    prune_stale: bool,
}

impl<P> std::fmt::Debug for IngestionPipeline<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("splitter", self.splitter.config())
            .field("collection", &self.collection)
            .field("prune_stale", &self.prune_stale)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> IngestionPipeline<P> {
    #[must_use]
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        splitter: TextSplitter,
        embedder: Embedder<P>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        runner: StepRunner,
    ) -> Self {
        Self {
            loader,
            splitter,
            embedder,
            store,
            collection: collection.into(),
            runner,
            prune_stale: true,
        }
    }

    /// Delete records left over from a longer previous version of the same source.
    #[must_use]
    pub fn with_prune_stale(mut self, enabled: bool) -> Self {
        self.prune_stale = enabled;
        self
    }

    #[must_use]
    pub fn runner(&self) -> &StepRunner {
        &self.runner
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Run the ingestion job, resuming after any step already recorded for `job.job_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`JobError`] naming the step that failed.
    pub async fn ingest(&self, job: &IngestJob) -> Result<IngestResult, JobError> {
        let span = tracing::info_span!("ingest", job_id = %job.job_id, source_id = %job.source_id);
        let job_id = job.job_id.as_str();
        let runner = &self.runner;

        let steps = async move {
            let loaded: ChunksAndSource = runner
                .run_step(job_id, LOAD_AND_CHUNK, move || self.load_and_chunk(job))
                .await?;

            let loaded = &loaded;
            let upserted: UpsertOutcome = runner
                .run_step(job_id, EMBED_AND_UPSERT, move || self.embed_and_upsert(loaded))
                .await?;

            if self.prune_stale {
                let upserted = &upserted;
                let _: PruneOutcome = runner
                    .run_step(job_id, PRUNE_STALE, move || self.prune(upserted))
                    .await?;
            }

            tracing::info!(ingested = upserted.ingested, "ingestion complete");
            Ok::<_, JobError>(IngestResult {
                ingested: upserted.ingested,
                source_id: upserted.source_id,
            })
        };

        runner
            .track_job(job_id, JOB_KIND, steps)
            .instrument(span)
            .await
    }

    async fn load_and_chunk(&self, job: &IngestJob) -> Result<ChunksAndSource, PipelineError> {
        let pages = self.loader.load(&job.pdf_path).await?;
        let text = concat_pages(&pages);
        let chunks = self.splitter.split_text(&text);
        tracing::info!(
            pages = pages.len(),
            chars = text.chars().count(),
            chunks = chunks.len(),
            "document chunked"
        );
        Ok(ChunksAndSource {
            chunks,
            source_id: job.source_id.clone(),
        })
    }

    async fn embed_and_upsert(
        &self,
        loaded: &ChunksAndSource,
    ) -> Result<UpsertOutcome, PipelineError> {
        let source_id = &loaded.source_id;
        if loaded.chunks.is_empty() {
            tracing::warn!("document produced no chunks, nothing to upsert");
            return Ok(UpsertOutcome {
                ingested: 0,
                source_id: source_id.clone(),
            });
        }

        let vectors = self.embedder.embed(&loaded.chunks).await?;
        self.store
            .ensure_collection(&self.collection, self.embedder.dimension() as u64)
            .await?;

        let count = loaded.chunks.len();
        let payloads = loaded
            .chunks
            .iter()
            .enumerate()
            .map(|(i, text)| chunk_payload(source_id, text, i))
            .collect();
        let points = points_from_parts(chunk_ids(source_id, count), vectors, payloads)?;
        self.store.upsert(&self.collection, points).await?;

        tracing::info!(points = count, collection = %self.collection, "chunks upserted");
        Ok(UpsertOutcome {
            ingested: count,
            source_id: source_id.clone(),
        })
    }

    async fn prune(&self, upserted: &UpsertOutcome) -> Result<PruneOutcome, PipelineError> {
        let outcome = PruneOutcome {
            source_id: upserted.source_id.clone(),
            kept: upserted.ingested,
        };
        if !self.store.collection_exists(&self.collection).await? {
            return Ok(outcome);
        }
        self.store
            .delete_by_filter(
                &self.collection,
                VectorFilter::chunks_from(&upserted.source_id, upserted.ingested),
            )
            .await?;
        tracing::debug!(kept = upserted.ingested, "stale chunks pruned");
        Ok(outcome)
    }
}
