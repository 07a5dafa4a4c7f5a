//! Document chunking, embedding and vector storage for the ragline pipelines.

pub mod document;
pub mod embedder;
pub mod in_memory_store;
pub mod qdrant_ops;
pub mod vector_store;

pub use embedder::{EmbedError, Embedder};
pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantOps;
pub use vector_store::{
    FieldCondition, FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore,
    VectorStoreError,
};
