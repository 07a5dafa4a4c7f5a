use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Payload key holding the source id.
pub const SOURCE_FIELD: &str = "source";
/// Payload key holding the chunk text.
pub const TEXT_FIELD: &str = "text";
/// Payload key holding the zero-based chunk index.
pub const CHUNK_INDEX_FIELD: &str = "chunk_index";

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("vector dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: u64, actual: u64 },
    #[error("length mismatch: {ids} ids, {vectors} vectors, {payloads} payloads")]
    LengthMismatch {
        ids: usize,
        vectors: usize,
        payloads: usize,
    },
    #[error("partial upsert: {written} of {total} points written: {reason}")]
    PartialUpsert {
        written: usize,
        total: usize,
        reason: String,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl VectorStoreError {
    /// Whether repeating the same call could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Collection(_)
                | Self::Upsert(_)
                | Self::Search(_)
                | Self::Delete(_)
                | Self::PartialUpsert { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
    pub must_not: Vec<FieldCondition>,
}

impl VectorFilter {
    #[must_use]
    pub fn must(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.must.push(FieldCondition {
            field: field.into(),
            value,
        });
        self
    }

    /// Records of `source_id` whose chunk index is `>= from_index`.
    #[must_use]
    pub fn chunks_from(source_id: &str, from_index: usize) -> Self {
        Self::default()
            .must(SOURCE_FIELD, FieldValue::Text(source_id.to_owned()))
            .must(
                CHUNK_INDEX_FIELD,
                FieldValue::AtLeast(i64::try_from(from_index).unwrap_or(i64::MAX)),
            )
    }
}

#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    /// Integer field greater than or equal to the value.
    AtLeast(i64),
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

/// Payload stored alongside every chunk vector.
#[must_use]
pub fn chunk_payload(
    source_id: &str,
    text: &str,
    chunk_index: usize,
) -> HashMap<String, serde_json::Value> {
    HashMap::from([
        (SOURCE_FIELD.to_owned(), serde_json::json!(source_id)),
        (TEXT_FIELD.to_owned(), serde_json::json!(text)),
        (CHUNK_INDEX_FIELD.to_owned(), serde_json::json!(chunk_index)),
    ])
}

/// Zip parallel id, vector and payload lists into points.
///
/// # Errors
///
/// Returns [`VectorStoreError::LengthMismatch`] if the lists differ in length.
pub fn points_from_parts(
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    payloads: Vec<HashMap<String, serde_json::Value>>,
) -> Result<Vec<VectorPoint>, VectorStoreError> {
    if ids.len() != vectors.len() || ids.len() != payloads.len() {
        return Err(VectorStoreError::LengthMismatch {
            ids: ids.len(),
            vectors: vectors.len(),
            payloads: payloads.len(),
        });
    }
    Ok(ids
        .into_iter()
        .zip(vectors)
        .zip(payloads)
        .map(|((id, vector), payload)| VectorPoint {
            id,
            vector,
            payload,
        })
        .collect())
}

pub(crate) fn check_dimension(expected: u64, vector: &[f32]) -> Result<(), VectorStoreError> {
    let actual = vector.len() as u64;
    if actual == expected {
        Ok(())
    } else {
        Err(VectorStoreError::DimensionMismatch { expected, actual })
    }
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore: Send + Sync {
    /// Create `collection` with cosine distance, or verify an existing one has
    /// `vector_size` dimensions.
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Insert or overwrite points by id. Nothing is written if any vector has the
    /// wrong dimension.
    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Nearest points by descending score, at most `limit` of them.
    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>>;
}
