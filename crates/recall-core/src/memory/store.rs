//! ============================================================================
//! Memory Store - Contract for durable memory collections
//! ============================================================================
//! Every backend the retrieval engine talks to implements `MemoryStore`.
//! Lookups by a malformed id are "not found", never errors.
//! ============================================================================

use async_trait::async_trait;
use thiserror::Error;

use super::types::{Memory, NewMemory, SearchHit, TagCount};

/// Errors a store can report
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database failed
    #[error("storage backend error: {0}")]
    Backend(String),
    /// The vector index is unavailable or rejected the query
    #[error("vector index error: {0}")]
    VectorIndex(String),
    /// A stored record could not be encoded or decoded
    #[error("record serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable collection of memories
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist a new memory and return it with its assigned id
    async fn insert(&self, memory: NewMemory) -> StoreResult<Memory>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Memory>>;

    /// Returns `true` if a memory was removed
    async fn delete_by_id(&self, id: &str) -> StoreResult<bool>;

    /// Most recent first
    async fn find_recent(&self, limit: usize) -> StoreResult<Vec<Memory>>;

    /// Memories carrying exactly `tag`, most recent first
    async fn find_by_tag(&self, tag: &str, limit: usize) -> StoreResult<Vec<Memory>>;

    /// Nearest neighbours of `vector` over the whole collection, each with a
    /// similarity score in [0, 1]. `candidate_pool` bounds how many nearest
    /// candidates an approximate index explores.
    async fn vector_search(
        &self,
        vector: &[f32],
        candidate_pool: usize,
        limit: usize,
    ) -> StoreResult<Vec<SearchHit>>;

    /// Case-insensitive substring match on title, solution or tags,
    /// most recent first
    async fn text_search(&self, substring: &str, limit: usize) -> StoreResult<Vec<Memory>>;

    /// Most used tags, highest count first
    async fn aggregate_tag_counts(&self, top_n: usize) -> StoreResult<Vec<TagCount>>;

    async fn count_all(&self) -> StoreResult<u64>;
}
