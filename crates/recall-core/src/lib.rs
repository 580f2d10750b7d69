//! ============================================================================
//! RECALL-CORE: Personal memory assistant
//! ============================================================================
//! This crate holds everything behind the chat transport:
//! - Memory model, embeddings and the hybrid retrieval engine
//! - redb-backed memory store with an optional Qdrant vector index
//! - Single-owner access gate
//! - Per-user conversation state machine and reply rendering
//! ============================================================================

pub mod access;
pub mod conversation;
pub mod db;
pub mod memory;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use access::{Access, AccessGate, UserId};
pub use conversation::{Assistant, InboundEvent, Reply};
pub use db::MemoryDb;
pub use memory::{EmbeddingService, Memory, RetrievalEngine, SearchHit, Stats};
