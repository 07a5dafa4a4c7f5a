//! Qdrant-backed [`VectorStore`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    GetCollectionInfoResponse, PointStruct, Range, ScoredPoint, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder, value::Kind, vectors_config,
};

use crate::vector_store::{
    BoxFuture, FieldCondition, FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError, check_dimension,
};

type QdrantResult<T> = Result<T, Box<qdrant_client::QdrantError>>;

/// Points sent per upsert request.
pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 256;

/// Thin wrapper over [`Qdrant`] encapsulating the collection operations ragline needs.
///
/// Collection dimensions are cached after the first lookup so vectors can be
/// checked before any write.
#[derive(Clone)]
pub struct QdrantOps {
    client: Qdrant,
    dimensions: Arc<RwLock<HashMap<String, u64>>>,
    upsert_batch_size: usize,
}

impl std::fmt::Debug for QdrantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantOps")
            .field("upsert_batch_size", &self.upsert_batch_size)
            .finish_non_exhaustive()
    }
}

impl QdrantOps {
    /// Create a new `QdrantOps` connected to the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str) -> QdrantResult<Self> {
        let client = Qdrant::from_url(url).build().map_err(Box::new)?;
        Ok(Self {
            client,
            dimensions: Arc::new(RwLock::new(HashMap::new())),
            upsert_batch_size: DEFAULT_UPSERT_BATCH_SIZE,
        })
    }

    #[must_use]
    pub fn with_upsert_batch_size(mut self, size: usize) -> Self {
        self.upsert_batch_size = size.max(1);
        self
    }

    /// Access the underlying Qdrant client for advanced operations.
    #[must_use]
    pub fn client(&self) -> &Qdrant {
        &self.client
    }

    async fn create_collection(&self, collection: &str, vector_size: u64) -> QdrantResult<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Vector size configured on an existing collection.
    async fn fetch_dimension(&self, collection: &str) -> QdrantResult<Option<u64>> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(Box::new)?;
        Ok(configured_dimension(&info))
    }

    async fn upsert_batch(&self, collection: &str, points: Vec<PointStruct>) -> QdrantResult<()> {
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    async fn search_points(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<Filter>,
    ) -> QdrantResult<Vec<ScoredPoint>> {
        let mut builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        if let Some(f) = filter {
            builder = builder.filter(f);
        }
        let results = self.client.search_points(builder).await.map_err(Box::new)?;
        Ok(results.result)
    }

    fn cached_dimension(&self, collection: &str) -> Option<u64> {
        self.dimensions
            .read()
            .ok()
            .and_then(|d| d.get(collection).copied())
    }

    fn remember_dimension(&self, collection: &str, dimension: u64) {
        if let Ok(mut d) = self.dimensions.write() {
            d.insert(collection.to_owned(), dimension);
        }
    }

    fn forget_dimension(&self, collection: &str) {
        if let Ok(mut d) = self.dimensions.write() {
            d.remove(collection);
        }
    }

    /// Dimension of `collection`, from cache or from the server.
    async fn known_dimension(&self, collection: &str) -> Result<Option<u64>, VectorStoreError> {
        if let Some(dim) = self.cached_dimension(collection) {
            return Ok(Some(dim));
        }
        let dim = self
            .fetch_dimension(collection)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        if let Some(dim) = dim {
            self.remember_dimension(collection, dim);
        }
        Ok(dim)
    }
}

/// Send `items` through `write` in chunks of `batch_size`, stopping at the first
/// failure. A failure after at least one chunk landed is a `PartialUpsert`.
async fn write_in_batches<T, F, Fut>(
    items: Vec<T>,
    batch_size: usize,
    mut write: F,
) -> Result<(), VectorStoreError>
where
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let total = items.len();
    let mut written = 0;
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        let batch: Vec<T> = items.by_ref().take(batch_size.max(1)).collect();
        let len = batch.len();
        if let Err(reason) = write(batch).await {
            return Err(if written == 0 {
                VectorStoreError::Upsert(reason)
            } else {
                VectorStoreError::PartialUpsert {
                    written,
                    total,
                    reason,
                }
            });
        }
        written += len;
    }
    Ok(())
}

fn configured_dimension(info: &GetCollectionInfoResponse) -> Option<u64> {
    let params = info.result.as_ref()?.config.as_ref()?.params.as_ref()?;
    match params.vectors_config.as_ref()?.config.as_ref()? {
        vectors_config::Config::Params(p) => Some(p.size),
        vectors_config::Config::ParamsMap(_) => None,
    }
}

fn to_point_struct(point: VectorPoint) -> Result<PointStruct, VectorStoreError> {
    let payload: HashMap<String, qdrant_client::qdrant::Value> =
        serde_json::from_value(serde_json::Value::Object(point.payload.into_iter().collect()))
            .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
    Ok(PointStruct::new(point.id, point.vector, payload))
}

impl VectorStore for QdrantOps {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let exists = self
                .client
                .collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
            if !exists {
                self.create_collection(&collection, vector_size)
                    .await
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
                tracing::info!(%collection, vector_size, "created qdrant collection");
                self.remember_dimension(&collection, vector_size);
                return Ok(());
            }

            match self.known_dimension(&collection).await? {
                Some(existing) if existing != vector_size => {
                    Err(VectorStoreError::DimensionMismatch {
                        expected: existing,
                        actual: vector_size,
                    })
                }
                _ => Ok(()),
            }
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .delete_collection(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            self.forget_dimension(&collection);
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if points.is_empty() {
                return Ok(());
            }
            if let Some(expected) = self.known_dimension(&collection).await? {
                for p in &points {
                    check_dimension(expected, &p.vector)?;
                }
            }

            let total = points.len();
            let qdrant_points = points
                .into_iter()
                .map(to_point_struct)
                .collect::<Result<Vec<_>, _>>()?;

            let name = collection.as_str();
            write_in_batches(qdrant_points, self.upsert_batch_size, move |batch| async move {
                self.upsert_batch(name, batch)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await?;
            tracing::debug!(%collection, points = total, "qdrant upsert complete");
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if limit == 0 {
                return Err(VectorStoreError::InvalidArgument(
                    "search limit must be at least 1".into(),
                ));
            }
            // A cold cache falls through to the server.
            if let Some(expected) = self.known_dimension(&collection).await? {
                check_dimension(expected, &vector)?;
            }
            let qdrant_filter = filter.map(vector_filter_to_qdrant);
            let results = self
                .search_points(&collection, vector, limit, qdrant_filter)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            Ok(results.into_iter().map(scored_point_to_vector).collect())
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(vector_filter_to_qdrant(filter))
                        .wait(true),
                )
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            Ok(())
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let response = self
                .client
                .count(CountPointsBuilder::new(&collection).exact(true))
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(response.result.map_or(0, |r| r.count))
        })
    }
}

fn vector_filter_to_qdrant(filter: VectorFilter) -> Filter {
    let must: Vec<_> = filter
        .must
        .into_iter()
        .map(field_condition_to_qdrant)
        .collect();
    let must_not: Vec<_> = filter
        .must_not
        .into_iter()
        .map(field_condition_to_qdrant)
        .collect();

    let mut f = Filter::default();
    if !must.is_empty() {
        f.must = must;
    }
    if !must_not.is_empty() {
        f.must_not = must_not;
    }
    f
}

#[allow(clippy::cast_precision_loss)]
fn field_condition_to_qdrant(cond: FieldCondition) -> Condition {
    match cond.value {
        FieldValue::Integer(v) => Condition::matches(cond.field, v),
        FieldValue::Text(v) => Condition::matches(cond.field, v),
        FieldValue::AtLeast(v) => Condition::range(
            cond.field,
            Range {
                gte: Some(v as f64),
                ..Default::default()
            },
        ),
    }
}

fn scored_point_to_vector(point: ScoredPoint) -> ScoredVectorPoint {
    let payload: HashMap<String, serde_json::Value> = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| {
            let json_val = match v.kind? {
                Kind::StringValue(s) => serde_json::Value::String(s),
                Kind::IntegerValue(i) => serde_json::Value::Number(i.into()),
                Kind::DoubleValue(d) => {
                    serde_json::Number::from_f64(d).map(serde_json::Value::Number)?
                }
                Kind::BoolValue(b) => serde_json::Value::Bool(b),
                _ => return None,
            };
            Some((k, json_val))
        })
        .collect();

    let id = match point.id.and_then(|pid| pid.point_id_options) {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    };

    ScoredVectorPoint {
        id,
        score: point.score,
        payload,
    }
}
