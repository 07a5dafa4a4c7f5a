use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::vector_store::{
    BoxFuture, FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore,
    VectorStoreError, check_dimension,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

struct InMemoryCollection {
    dimension: u64,
    points: HashMap<String, StoredPoint>,
}

/// Process-local [`VectorStore`] using brute-force cosine similarity.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity; 0.0 when either side is the zero vector.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>() / denom
}

fn matches_filter(payload: &HashMap<String, serde_json::Value>, filter: &VectorFilter) -> bool {
    let hit = |field: &str, value: &FieldValue| {
        payload
            .get(field)
            .is_some_and(|v| field_matches(v, value))
    };
    filter.must.iter().all(|c| hit(&c.field, &c.value))
        && !filter.must_not.iter().any(|c| hit(&c.field, &c.value))
}

fn field_matches(val: &serde_json::Value, expected: &FieldValue) -> bool {
    match expected {
        FieldValue::Integer(i) => val.as_i64() == Some(*i),
        FieldValue::Text(s) => val.as_str() == Some(s.as_str()),
        FieldValue::AtLeast(min) => val.as_i64().is_some_and(|v| v >= *min),
    }
}

type Collections = HashMap<String, InMemoryCollection>;
type ErrorKind = fn(String) -> VectorStoreError;

impl InMemoryVectorStore {
    fn read(&self, kind: ErrorKind) -> Result<RwLockReadGuard<'_, Collections>, VectorStoreError> {
        self.collections.read().map_err(|e| kind(e.to_string()))
    }

    fn write(
        &self,
        kind: ErrorKind,
    ) -> Result<RwLockWriteGuard<'_, Collections>, VectorStoreError> {
        self.collections.write().map_err(|e| kind(e.to_string()))
    }
}

fn not_found(kind: ErrorKind, name: &str) -> VectorStoreError {
    kind(format!("collection {name} not found"))
}

fn existing<'a>(
    cols: &'a Collections,
    name: &str,
    kind: ErrorKind,
) -> Result<&'a InMemoryCollection, VectorStoreError> {
    cols.get(name).ok_or_else(|| not_found(kind, name))
}

fn existing_mut<'a>(
    cols: &'a mut Collections,
    name: &str,
    kind: ErrorKind,
) -> Result<&'a mut InMemoryCollection, VectorStoreError> {
    cols.get_mut(name).ok_or_else(|| not_found(kind, name))
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.write(VectorStoreError::Collection)?;
            let col = cols.entry(name).or_insert_with(|| InMemoryCollection {
                dimension: vector_size,
                points: HashMap::new(),
            });
            if col.dimension == vector_size {
                Ok(())
            } else {
                Err(VectorStoreError::DimensionMismatch {
                    expected: col.dimension,
                    actual: vector_size,
                })
            }
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move { Ok(self.read(VectorStoreError::Collection)?.contains_key(&name)) })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            self.write(VectorStoreError::Collection)?.remove(&name);
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.write(VectorStoreError::Upsert)?;
            let col = existing_mut(&mut cols, &name, VectorStoreError::Upsert)?;
            // Validate the whole batch first so a bad vector writes nothing.
            points
                .iter()
                .try_for_each(|p| check_dimension(col.dimension, &p.vector))?;
            col.points.extend(points.into_iter().map(|p| {
                (
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        payload: p.payload,
                    },
                )
            }));
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
        let name = collection.to_owned();
        Box::pin(async move {
            if limit == 0 {
                return Err(VectorStoreError::InvalidArgument(
                    "search limit must be at least 1".into(),
                ));
            }
            let cols = self.read(VectorStoreError::Search)?;
            let col = existing(&cols, &name, VectorStoreError::Search)?;
            check_dimension(col.dimension, &vector)?;

            let filter = filter.unwrap_or_default();
            let mut scored: Vec<ScoredVectorPoint> = col
                .points
                .iter()
                .filter(|(_, stored)| matches_filter(&stored.payload, &filter))
                .map(|(id, stored)| ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(&vector, &stored.vector),
                    payload: stored.payload.clone(),
                })
                .collect();

            // Ties broken by id so equal scores come back in a stable order.
            scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(scored)
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.write(VectorStoreError::Delete)?;
            existing_mut(&mut cols, &name, VectorStoreError::Delete)?
                .points
                .retain(|_, stored| !matches_filter(&stored.payload, &filter));
            Ok(())
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let cols = self.read(VectorStoreError::Collection)?;
            let col = existing(&cols, &name, VectorStoreError::Collection)?;
            Ok(col.points.len() as u64)
        })
    }
}
