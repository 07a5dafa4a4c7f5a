//! End-to-end scenarios over the wired pipelines with a mock provider, the
//! in-memory vector store and a page-serving document loader.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ragline_core::bootstrap::{App, assemble};
use ragline_core::config::{Config, StepStoreKind, VectorBackend};
use ragline_core::pipeline::ingest::{EMBED_AND_UPSERT, LOAD_AND_CHUNK, PRUNE_STALE};
use ragline_core::{IngestRequest, IngestResult, QueryRequest};
use ragline_llm::mock::MockProvider;
use ragline_memory::document::{Document, DocumentError, DocumentLoader, DocumentMetadata, chunk_id};
use ragline_memory::{InMemoryVectorStore, VectorStore};
use ragline_steps::{InMemoryStepStore, JobStatus, SqliteStepStore, StepStore};

const COLLECTION: &str = "ragline_chunks";
const THREE_CHUNKS: &str = "Rust is a systems programming language. \
Ownership rules are checked at compile time. Cargo builds and tests crates.";

#[derive(Default)]
struct PageLoader {
    pages: Mutex<HashMap<String, Vec<String>>>,
    loads: AtomicUsize,
}

impl PageLoader {
    fn with(path: &str, pages: &[&str]) -> Arc<Self> {
        let loader = Self::default();
        loader.set(path, pages);
        Arc::new(loader)
    }

    fn set(&self, path: &str, pages: &[&str]) {
        self.pages.lock().unwrap().insert(
            path.to_owned(),
            pages.iter().map(|p| (*p).to_owned()).collect(),
        );
    }
}

impl DocumentLoader for PageLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let key = path.display().to_string();
        let pages = self.pages.lock().unwrap().get(&key).cloned();
        Box::pin(async move {
            let pages = pages.ok_or_else(|| {
                DocumentError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, key.clone()))
            })?;
            Ok(pages
                .into_iter()
                .enumerate()
                .filter(|(_, text)| !text.trim().is_empty())
                .map(|(i, content)| Document {
                    content,
                    metadata: DocumentMetadata {
                        source: key.clone(),
                        content_type: "application/pdf".into(),
                        extra: HashMap::from([("page".to_owned(), (i + 1).to_string())]),
                    },
                })
                .collect())
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.vector_store.backend = VectorBackend::Memory;
    config.steps.store = StepStoreKind::Memory;
    config.steps.base_backoff_ms = 1;
    config.steps.max_backoff_ms = 2;
    config.llm.embedding_dim = 16;
    config.chunking.chunk_size = 60;
    config.chunking.chunk_overlap = 10;
    config
}

struct World {
    provider: Arc<MockProvider>,
    loader: Arc<PageLoader>,
    store: Arc<InMemoryVectorStore>,
    app: App<MockProvider>,
}

fn world_with(
    provider: MockProvider,
    loader: Arc<PageLoader>,
    steps: Arc<dyn StepStore>,
) -> World {
    let provider = Arc::new(provider.with_dimension(16));
    let store = Arc::new(InMemoryVectorStore::new());
    let app = assemble(
        config(),
        provider.clone(),
        loader.clone(),
        store.clone(),
        steps,
    )
    .unwrap();
    World {
        provider,
        loader,
        store,
        app,
    }
}

fn world(provider: MockProvider) -> World {
    world_with(
        provider,
        PageLoader::with("/data/report.pdf", &[THREE_CHUNKS]),
        Arc::new(InMemoryStepStore::new()),
    )
}

async fn ingest(w: &World, source_id: &str) -> IngestResult {
    let job = IngestRequest::new("/data/report.pdf")
        .with_source_id(source_id)
        .validate()
        .unwrap();
    w.app.ingest.ingest(&job).await.unwrap()
}

#[tokio::test]
async fn scenario_a_first_ingestion() {
    let w = world(MockProvider::default());
    let result = ingest(&w, "doc1").await;
    assert_eq!(
        result,
        IngestResult {
            ingested: 3,
            source_id: "doc1".into()
        }
    );
    assert_eq!(w.store.count(COLLECTION).await.unwrap(), 3);

    let hits = w
        .store
        .search(COLLECTION, w.provider.embed_text("Rust"), 10, None)
        .await
        .unwrap();
    let mut ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
    ids.sort();
    let mut expected: Vec<String> = (0..3).map(|i| chunk_id("doc1", i)).collect();
    expected.sort();
    assert_eq!(ids, expected);
    for hit in &hits {
        assert_eq!(hit.payload["source"], "doc1");
        assert!(hit.payload["chunk_index"].as_u64().unwrap() < 3);
    }
}

#[tokio::test]
async fn scenario_b_reingestion_is_idempotent() {
    let w = world(MockProvider::default());
    ingest(&w, "doc1").await;
    let again = ingest(&w, "doc1").await;
    assert_eq!(again.ingested, 3);
    assert_eq!(again.source_id, "doc1");
    assert_eq!(w.store.count(COLLECTION).await.unwrap(), 3);
}

#[tokio::test]
async fn scenario_c_query_over_ingested_document() {
    let w = world(MockProvider::with_responses(vec![
        "Rust is a systems programming language.".into(),
    ]));
    ingest(&w, "doc1").await;

    let job = QueryRequest::new("What is Rust?")
        .with_top_k(2)
        .validate()
        .unwrap();
    let answer = w.app.query.answer(&job).await.unwrap();
    assert_eq!(answer.num_contexts, 2);
    assert!(answer.sources.contains(&"doc1".to_owned()));
    assert!(!answer.answer.is_empty());

    let prompt = &w.provider.recorded()[0][1].content;
    assert!(prompt.contains("(source: doc1)"));
    assert!(prompt.contains("Question: What is Rust?"));
}

#[tokio::test]
async fn scenario_d_query_against_empty_collection() {
    let w = world(MockProvider::with_responses(vec![
        "I could not find relevant information in the indexed documents.".into(),
    ]));
    let job = QueryRequest::new("What is Rust?").validate().unwrap();
    let answer = w.app.query.answer(&job).await.unwrap();
    assert_eq!(answer.num_contexts, 0);
    assert!(answer.sources.is_empty());
    assert!(answer.answer.contains("could not find relevant information"));
    assert!(w.provider.recorded()[0][1]
        .content
        .contains("(no context retrieved)"));
}

#[tokio::test]
async fn source_id_defaults_to_pdf_path() {
    let w = world(MockProvider::default());
    let job = IngestRequest::new("/data/report.pdf").validate().unwrap();
    let result = w.app.ingest.ingest(&job).await.unwrap();
    assert_eq!(result.source_id, "/data/report.pdf");
}

#[tokio::test]
async fn shrunken_reingestion_leaves_exactly_new_chunk_count() {
    let w = world(MockProvider::default());
    ingest(&w, "doc1").await;
    w.loader
        .set("/data/report.pdf", &["Rust is a systems programming language."]);
    let result = ingest(&w, "doc1").await;
    assert_eq!(result.ingested, 1);
    assert_eq!(w.store.count(COLLECTION).await.unwrap(), 1);
}

#[tokio::test]
async fn blank_pages_are_dropped_before_chunking() {
    let loader = PageLoader::with("/data/report.pdf", &["", THREE_CHUNKS, "   "]);
    let w = world_with(
        MockProvider::default(),
        loader,
        Arc::new(InMemoryStepStore::new()),
    );
    assert_eq!(ingest(&w, "doc1").await.ingested, 3);
}

#[tokio::test]
async fn failed_job_resumes_from_sqlite_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("steps.db");
    let db = db.to_str().unwrap();
    let loader = PageLoader::with("/data/report.pdf", &[THREE_CHUNKS]);
    let job = IngestRequest::new("/data/report.pdf")
        .with_source_id("doc1")
        .with_job_id("job-42")
        .validate()
        .unwrap();

    {
        let steps = Arc::new(SqliteStepStore::open(db).await.unwrap());
        let w = world_with(
            MockProvider::default().with_embed_failures(100),
            loader.clone(),
            steps.clone(),
        );
        let err = w.app.ingest.ingest(&job).await.unwrap_err();
        assert_eq!(err.step(), Some(EMBED_AND_UPSERT));
        assert_eq!(
            steps.completed_steps("job-42").await.unwrap(),
            vec![LOAD_AND_CHUNK]
        );
        steps.pool().close().await;
    }

    let steps = Arc::new(SqliteStepStore::open(db).await.unwrap());
    let w = world_with(MockProvider::default(), loader.clone(), steps.clone());
    let result = w.app.ingest.ingest(&job).await.unwrap();
    assert_eq!(result.ingested, 3);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert_eq!(
        steps.completed_steps("job-42").await.unwrap(),
        vec![LOAD_AND_CHUNK, EMBED_AND_UPSERT, PRUNE_STALE]
    );
    assert_eq!(
        steps.job("job-42").await.unwrap().unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_jobs_share_stores_without_interference() {
    let w = world(MockProvider::default());
    ingest(&w, "seed").await;

    let mut handles = Vec::new();
    for i in 0..4 {
        let app = w.app.clone();
        handles.push(tokio::spawn(async move {
            let job = IngestRequest::new("/data/report.pdf")
                .with_source_id(format!("doc{i}"))
                .with_job_id(format!("ingest-{i}"))
                .validate()
                .unwrap();
            let result = app.ingest.ingest(&job).await.unwrap();
            assert_eq!(result.ingested, 3);
            assert_eq!(result.source_id, format!("doc{i}"));
        }));
    }
    for i in 0..3 {
        let app = w.app.clone();
        handles.push(tokio::spawn(async move {
            let job = QueryRequest::new("What is Rust?")
                .with_top_k(2)
                .with_job_id(format!("query-{i}"))
                .validate()
                .unwrap();
            let answer = app.query.answer(&job).await.unwrap();
            assert_eq!(answer.num_contexts, 2);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(w.store.count(COLLECTION).await.unwrap(), 15);
    assert_eq!(w.loader.loads.load(Ordering::SeqCst), 5);
    let jobs = (0..4)
        .map(|i| format!("ingest-{i}"))
        .chain((0..3).map(|i| format!("query-{i}")));
    for job_id in jobs {
        let record = w.app.step_store.job(&job_id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Completed, "{job_id}");
    }
    for i in 0..4 {
        assert_eq!(
            w.app.step_store.completed_steps(&format!("ingest-{i}")).await.unwrap(),
            vec![LOAD_AND_CHUNK, EMBED_AND_UPSERT, PRUNE_STALE]
        );
    }
}
