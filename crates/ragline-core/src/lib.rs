//! Ingestion and query pipelines, trigger schemas, configuration and bootstrap.

pub mod bootstrap;
pub mod config;
pub mod events;
pub mod pipeline;
pub mod vault;

pub use bootstrap::{App, AppBuilder};
pub use config::Config;
pub use events::{IngestRequest, IngestResult, QueryAnswer, QueryRequest, RequestError};
pub use pipeline::{IngestionPipeline, JobError, PipelineError, QueryPipeline};
