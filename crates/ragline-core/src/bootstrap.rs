//! Application bootstrap: config resolution, client construction and pipeline wiring.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ragline_llm::LlmProvider;
use ragline_llm::any::AnyProvider;
use ragline_llm::http::default_client;
use ragline_llm::openai::OpenAiProvider;
use ragline_memory::document::{DocumentLoader, PdfLoader, TextSplitter};
use ragline_memory::{Embedder, InMemoryVectorStore, QdrantOps, VectorStore};
use ragline_steps::{InMemoryStepStore, SqliteStepStore, StepRunner, StepStore};

use crate::config::{Config, StepStoreKind, VectorBackend};
use crate::pipeline::{IngestionPipeline, PipelineError, QueryPipeline};
use crate::vault::{EnvVaultProvider, VaultProvider};

const DEFAULT_CONFIG_PATH: &str = "config/ragline.toml";

/// Fully wired application: shared clients plus both pipelines.
pub struct App<P = AnyProvider> {
    pub config: Config,
    pub vector_store: Arc<dyn VectorStore>,
    pub step_store: Arc<dyn StepStore>,
    pub ingest: Arc<IngestionPipeline<P>>,
    pub query: Arc<QueryPipeline<P>>,
}

impl<P> Clone for App<P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            vector_store: Arc::clone(&self.vector_store),
            step_store: Arc::clone(&self.step_store),
            ingest: Arc::clone(&self.ingest),
            query: Arc::clone(&self.query),
        }
    }
}

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Resolve the config path, load it and resolve secrets from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded or is invalid.
    pub async fn load(cli_path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = resolve_config_path(cli_path);
        let mut config = Config::load(&config_path)?;
        config.resolve_secrets(&EnvVaultProvider).await?;
        tracing::debug!(path = %config_path.display(), "configuration loaded");
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Start from an already built config, resolving secrets through `vault`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the vault fails.
    pub async fn with_config(mut config: Config, vault: &dyn VaultProvider) -> anyhow::Result<Self> {
        config.validate()?;
        config.resolve_secrets(vault).await?;
        Ok(Self {
            config,
            config_path: PathBuf::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client cannot be built.
    pub fn build_provider(&self) -> anyhow::Result<AnyProvider> {
        create_provider(&self.config)
    }

    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn build_vector_store(&self) -> anyhow::Result<Arc<dyn VectorStore>> {
        create_vector_store(&self.config)
    }

    /// # Errors
    ///
    /// Returns an error if the `SQLite` database cannot be opened.
    pub async fn build_step_store(&self) -> anyhow::Result<Arc<dyn StepStore>> {
        create_step_store(&self.config).await
    }

    /// Construct every client once and wire the pipelines.
    ///
    /// # Errors
    ///
    /// Returns an error if any client cannot be constructed.
    pub async fn build(self) -> anyhow::Result<App> {
        let provider = Arc::new(self.build_provider()?);
        let vector_store = self.build_vector_store()?;
        let step_store = self.build_step_store().await?;
        let loader = Arc::new(PdfLoader::new(self.config.ingestion.max_file_size));
        tracing::info!(
            provider = provider.name(),
            backend = ?self.config.vector_store.backend,
            collection = %self.config.vector_store.collection,
            step_store = ?self.config.steps.store,
            "application assembled"
        );
        Ok(assemble(
            self.config,
            provider,
            loader,
            vector_store,
            step_store,
        )?)
    }
}

/// Priority: `--config` > `RAGLINE_CONFIG` env > `config/ragline.toml`.
#[must_use]
pub fn resolve_config_path(cli_path: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("RAGLINE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// # Errors
///
/// Returns an error if no API key was resolved or the HTTP client cannot be built.
pub fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    let api_key = config
        .secrets
        .openai_api_key
        .as_ref()
        .context("OpenAI API key not set (RAGLINE_OPENAI_API_KEY or OPENAI_API_KEY)")?;
    let client = default_client(
        Duration::from_secs(config.timeouts.connect_secs),
        Duration::from_secs(config.timeouts.request_secs),
    )?;
    let provider = OpenAiProvider::new(
        client,
        api_key.expose().to_owned(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.embedding_model.clone(),
    )
    .with_max_retries(config.llm.max_retries);
    Ok(AnyProvider::OpenAi(provider))
}

/// # Errors
///
/// Returns an error if the Qdrant client cannot be created.
pub fn create_vector_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.vector_store.backend {
        VectorBackend::Qdrant => {
            let ops = QdrantOps::new(&config.vector_store.url).map_err(|e| {
                anyhow::anyhow!(
                    "failed to create Qdrant client for {}: {e}",
                    config.vector_store.url
                )
            })?;
            Ok(Arc::new(ops))
        }
        VectorBackend::Memory => {
            tracing::warn!("using in-memory vector store, records are lost on exit");
            Ok(Arc::new(InMemoryVectorStore::new()))
        }
    }
}

/// # Errors
///
/// Returns an error if the `SQLite` database cannot be opened.
pub async fn create_step_store(config: &Config) -> anyhow::Result<Arc<dyn StepStore>> {
    match config.steps.store {
        StepStoreKind::Sqlite => {
            let store = SqliteStepStore::open(&config.steps.sqlite_path)
                .await
                .with_context(|| {
                    format!("failed to open step store at {}", config.steps.sqlite_path)
                })?;
            Ok(Arc::new(store))
        }
        StepStoreKind::Memory => Ok(Arc::new(InMemoryStepStore::new())),
    }
}

/// Wire both pipelines around injected clients.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the chunking settings are rejected.
pub fn assemble<P: LlmProvider>(
    config: Config,
    provider: Arc<P>,
    loader: Arc<dyn DocumentLoader>,
    vector_store: Arc<dyn VectorStore>,
    step_store: Arc<dyn StepStore>,
) -> Result<App<P>, PipelineError> {
    let splitter = TextSplitter::new(config.chunking.splitter_config())
        .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
    let embedder = Embedder::new(provider, config.llm.embedding_dim)
        .with_batch_size(config.llm.embed_batch_size);
    let runner = StepRunner::new(Arc::clone(&step_store), config.steps.retry_policy());
    let collection = config.vector_store.collection.clone();

    let ingest = IngestionPipeline::new(
        loader,
        splitter,
        embedder.clone(),
        Arc::clone(&vector_store),
        collection.clone(),
        runner.clone(),
    )
    .with_prune_stale(config.ingestion.prune_stale_chunks);

    let query = QueryPipeline::new(embedder, Arc::clone(&vector_store), collection, runner)
        .with_default_top_k(config.query.default_top_k)
        .with_generation(ragline_llm::GenerationOptions {
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        });

    Ok(App {
        config,
        vector_store,
        step_store,
        ingest: Arc::new(ingest),
        query: Arc::new(query),
    })
}
