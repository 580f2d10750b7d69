//! ============================================================================
//! Memory Module - Saved solutions and how to find them again
//! ============================================================================
//! Provides the memory data model, embedding generation, the store contract,
//! the optional vector index, and the retrieval engine that ties them
//! together.
//!
//! ## Architecture
//! ```text
//! Query → Embed ──(vector)──→ Vector Search ──ok──→ Scored Results
//!           │                        │
//!        (empty)                  (error)
//!           ↓                        ↓
//!           └────→ Keyword Search (first 50 chars) → Newest-first Results
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use recall_core::memory::{EmbeddingService, RetrievalEngine};
//! use recall_core::MemoryDb;
//!
//! let store = Arc::new(MemoryDb::open(None)?);
//! let embedder = Arc::new(EmbeddingService::new_openai(api_key));
//! let engine = RetrievalEngine::new(store, embedder);
//!
//! let hits = engine.search("how did we fix the caching issue", 5).await?;
//! ```
//! ============================================================================

mod embeddings;
mod index;
mod retrieval;
mod store;
mod types;

// Re-export public types
pub use embeddings::{
    EmbeddingOutcome, EmbeddingService, Embedder, NoEmbeddings, DEFAULT_EMBEDDING_BASE_URL,
    DEFAULT_EMBEDDING_MODEL, EMBEDDING_DIM,
};
pub use index::{cosine_similarity, normalized_score, QdrantIndex, VectorIndex, COLLECTION_NAME};
pub use retrieval::{RetrievalEngine, CANDIDATE_POOL, KEYWORD_PREFIX_CHARS};
pub use store::{MemoryStore, StoreError, StoreResult};
pub use types::{
    embedding_text, normalize_tag, parse_tags, Memory, MemoryDraft, NewMemory, SearchHit, Stats,
    TagCount, TAG_SEPARATOR, UNTITLED,
};
