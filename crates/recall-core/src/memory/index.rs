//! ============================================================================
//! Vector Index - Approximate nearest-neighbour search over embeddings
//! ============================================================================
//! The embedded store can hand vector queries to an external index (Qdrant).
//! Without one it scans stored embeddings with `cosine_similarity`.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    PointStruct, PointsIdsList, SearchParamsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::embeddings::EMBEDDING_DIM;

/// Collection name for memory vectors
pub const COLLECTION_NAME: &str = "recall_memories";

/// External nearest-neighbour index keyed by memory id
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, id: &str, vector: &[f32]) -> Result<()>;

    /// Returns `(memory id, score in [0, 1])`, best first
    async fn search(
        &self,
        vector: &[f32],
        candidate_pool: usize,
        limit: usize,
    ) -> Result<Vec<(String, f32)>>;

    async fn remove(&self, id: &str) -> Result<()>;

    async fn health_check(&self) -> Result<bool>;
}

/// Cosine similarity of two vectors. `None` when the lengths differ or
/// either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Map a cosine in [-1, 1] onto a similarity score in [0, 1]
pub fn normalized_score(cosine: f32) -> f32 {
    ((1.0 + cosine) / 2.0).clamp(0.0, 1.0)
}

/// Vector index backed by a Qdrant collection
pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    /// Connect to Qdrant and make sure the collection exists
    pub async fn connect(url: &str) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| anyhow!("Failed to create Qdrant client: {}", e))?;

        let index = Self { client };
        index.ensure_collection().await?;

        Ok(index)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(COLLECTION_NAME)
            .await
            .map_err(|e| anyhow!("Failed to check collection existence: {}", e))?;

        if exists {
            debug!("Collection {} already exists", COLLECTION_NAME);
            return Ok(());
        }

        info!("Creating collection: {}", COLLECTION_NAME);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(COLLECTION_NAME).vectors_config(
                    VectorParamsBuilder::new(EMBEDDING_DIM as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| anyhow!("Failed to create collection: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, id: &str, vector: &[f32]) -> Result<()> {
        let payload: HashMap<String, Value> =
            [("memory_id".to_string(), Value::from(id.to_string()))]
                .into_iter()
                .collect();

        let point = PointStruct::new(id.to_string(), vector.to_vec(), payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(COLLECTION_NAME, vec![point]))
            .await
            .map_err(|e| anyhow!("Failed to upsert vector: {}", e))?;

        debug!("Indexed vector for memory {}", id);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        candidate_pool: usize,
        limit: usize,
    ) -> Result<Vec<(String, f32)>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(COLLECTION_NAME, vector.to_vec(), limit as u64)
                    .params(SearchParamsBuilder::default().hnsw_ef(candidate_pool as u64)),
            )
            .await
            .map_err(|e| anyhow!("Failed to search vectors: {}", e))?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = match point.id?.point_id_options? {
                    PointIdOptions::Uuid(uuid) => uuid,
                    PointIdOptions::Num(_) => return None,
                };
                Some((id, normalized_score(point.score)))
            })
            .collect();

        Ok(hits)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.client
            .delete_points(DeletePointsBuilder::new(COLLECTION_NAME).points(PointsIdsList {
                ids: vec![id.to_string().into()],
            }))
            .await
            .map_err(|e| anyhow!("Failed to delete vector: {}", e))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.health_check().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Qdrant health check failed: {}", e);
                Ok(false)
            }
        }
    }
}
