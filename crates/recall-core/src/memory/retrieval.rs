//! ============================================================================
//! Retrieval Engine - Orchestrates memory storage and retrieval
//! ============================================================================
//! Semantic search first, keyword search whenever the embedding provider or
//! the vector index is degraded. Secondary reads go straight to the store.
//! ============================================================================

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::embeddings::{EmbeddingOutcome, Embedder};
use super::store::{MemoryStore, StoreResult};
use super::types::{embedding_text, normalize_tag, Memory, NewMemory, SearchHit, Stats};

/// Candidates considered by the vector index per query
pub const CANDIDATE_POOL: usize = 100;

/// Characters of the query used by the keyword fallback
pub const KEYWORD_PREFIX_CHARS: usize = 50;

/// Memory retrieval combining the store and the embedding provider
#[derive(Clone)]
pub struct RetrievalEngine {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn MemoryStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Search memories by meaning, falling back to keywords
    pub async fn search(&self, query: &str, limit: usize) -> StoreResult<Vec<SearchHit>> {
        debug!("Searching memories (limit {}): {}", limit, query);

        let vector = match self.embedder.embed(query).await {
            EmbeddingOutcome::Vector(vector) => vector,
            EmbeddingOutcome::Empty => {
                debug!("No query embedding, using keyword search");
                return self.keyword_search(query, limit).await;
            }
            EmbeddingOutcome::Failed(reason) => {
                warn!("Query embedding failed ({}), using keyword search", reason);
                return self.keyword_search(query, limit).await;
            }
        };

        let pool = CANDIDATE_POOL.max(limit);
        match self.store.vector_search(&vector, pool, limit).await {
            Ok(hits) => {
                debug!("Vector search returned {} hits", hits.len());
                Ok(hits)
            }
            Err(e) => {
                warn!("Vector search error: {}, using keyword search", e);
                self.keyword_search(query, limit).await
            }
        }
    }

    /// Keyword fallback: the first 50 characters of the query as a
    /// case-insensitive substring, newest first, no scores
    pub async fn keyword_search(&self, query: &str, limit: usize) -> StoreResult<Vec<SearchHit>> {
        let term: String = query.chars().take(KEYWORD_PREFIX_CHARS).collect();

        let hits = self
            .store
            .text_search(&term, limit)
            .await?
            .into_iter()
            .map(SearchHit::unscored)
            .collect();
        Ok(hits)
    }

    /// Embed and persist a new memory. A failed embedding never blocks the
    /// save; the memory is stored with an empty vector instead.
    pub async fn save(&self, mut memory: NewMemory) -> StoreResult<Memory> {
        let text = embedding_text(&memory.title, &memory.tags, &memory.solution, &memory.context);

        memory.embedding = match self.embedder.embed(&text).await {
            EmbeddingOutcome::Vector(vector) => vector,
            EmbeddingOutcome::Empty => Vec::new(),
            EmbeddingOutcome::Failed(reason) => {
                warn!("Saving \"{}\" without embedding: {}", memory.title, reason);
                Vec::new()
            }
        };

        let saved = self.store.insert(memory).await?;
        info!("Saved memory {} with {} tags", saved.id, saved.tags.len());
        Ok(saved)
    }

    /// Memories carrying a tag (normalized like user input), newest first
    pub async fn by_tag(&self, tag: &str, limit: usize) -> StoreResult<Vec<Memory>> {
        self.store.find_by_tag(&normalize_tag(tag), limit).await
    }

    pub async fn recent(&self, limit: usize) -> StoreResult<Vec<Memory>> {
        self.store.find_recent(limit).await
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<Memory>> {
        self.store.find_by_id(id).await
    }

    pub async fn delete(&self, id: &str) -> StoreResult<bool> {
        self.store.delete_by_id(id).await
    }

    /// Total count plus the `top_n` most used tags
    pub async fn stats(&self, top_n: usize) -> StoreResult<Stats> {
        Ok(Stats {
            total: self.store.count_all().await?,
            top_tags: self.store.aggregate_tag_counts(top_n).await?,
        })
    }

    /// Get reference to the store (for advanced operations)
    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{engine_with, new_memory, FlakyIndex, StubEmbedder};
    use std::sync::atomic::Ordering;

    fn titles(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.memory.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_semantic_search_returns_scores() {
        let embedder = StubEmbedder::always(EmbeddingOutcome::Empty)
            .with("caching issue", vec![1.0, 0.0]);
        let (engine, db) = engine_with(Arc::new(embedder), None);

        db.insert(new_memory("redis cache", "x", &[], vec![0.9, 0.1])).await.unwrap();
        db.insert(new_memory("cron job", "x", &[], vec![0.0, 1.0])).await.unwrap();

        let hits = engine.search("caching issue", 5).await.unwrap();
        assert_eq!(titles(&hits), vec!["redis cache", "cron job"]);
        assert!(hits.iter().all(|h| h.score.is_some()));
    }

    #[tokio::test]
    async fn test_empty_embedding_equals_keyword_search() {
        let (engine, db) = engine_with(
            Arc::new(StubEmbedder::always(EmbeddingOutcome::Empty)),
            None,
        );
        db.insert(new_memory("Caching issue in API", "x", &[], vec![1.0])).await.unwrap();
        db.insert(new_memory("unrelated", "x", &[], vec![1.0])).await.unwrap();
        db.insert(new_memory("again", "the caching issue came back", &[], vec![])).await.unwrap();

        let searched = engine.search("caching issue", 5).await.unwrap();
        let keyword = engine.keyword_search("caching issue", 5).await.unwrap();
        assert_eq!(searched, keyword);
        assert_eq!(titles(&searched), vec!["again", "Caching issue in API"]);
    }

    #[tokio::test]
    async fn test_failed_embedding_falls_back() {
        let (engine, db) = engine_with(
            Arc::new(StubEmbedder::always(EmbeddingOutcome::Failed("503".into()))),
            None,
        );
        db.insert(new_memory("timeout on render", "x", &[], vec![])).await.unwrap();

        let hits = engine.search("timeout", 5).await.unwrap();
        assert_eq!(titles(&hits), vec!["timeout on render"]);
        assert!(hits[0].score.is_none());
    }

    #[tokio::test]
    async fn test_vector_index_error_falls_back_to_keywords() {
        let embedder = StubEmbedder::always(EmbeddingOutcome::Vector(vec![1.0, 0.0]));
        let index = Arc::new(FlakyIndex::default());
        let (engine, db) = engine_with(Arc::new(embedder), Some(index.clone()));

        for i in 0..7 {
            db.insert(new_memory(&format!("caching issue #{}", i), "x", &["cache"], vec![1.0, 0.0]))
                .await
                .unwrap();
        }
        db.insert(new_memory("other", "nothing here", &[], vec![1.0, 0.0])).await.unwrap();

        index.set_down(true);
        let hits = engine.search("caching issue", 5).await.unwrap();

        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|h| h.score.is_none()));
        assert_eq!(hits[0].memory.title, "caching issue #6");
        assert_eq!(hits[4].memory.title, "caching issue #2");
    }

    #[tokio::test]
    async fn test_keyword_search_uses_first_50_chars() {
        let (engine, db) = engine_with(
            Arc::new(StubEmbedder::always(EmbeddingOutcome::Empty)),
            None,
        );
        let prefix = "a".repeat(KEYWORD_PREFIX_CHARS);
        db.insert(new_memory(&prefix, "x", &[], vec![])).await.unwrap();

        let query = format!("{}-and-a-long-tail", prefix);
        let hits = engine.search(&query, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_keyword_prefix_counts_characters() {
        let (engine, db) = engine_with(
            Arc::new(StubEmbedder::always(EmbeddingOutcome::Empty)),
            None,
        );
        let prefix = "ש".repeat(KEYWORD_PREFIX_CHARS);
        db.insert(new_memory(&prefix, "x", &[], vec![])).await.unwrap();

        let hits = engine.keyword_search(&format!("{}ם", prefix), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_save_embeds_canonical_text() {
        let text = embedding_text(
            "N+1 fix",
            &["mongo".to_string(), "redis".to_string(), "cache".to_string()],
            "use batched lookups",
            "",
        );
        let embedder = Arc::new(
            StubEmbedder::always(EmbeddingOutcome::Empty).with(&text, vec![0.25, 0.75]),
        );
        let (engine, _db) = engine_with(embedder.clone(), None);

        let saved = engine
            .save(new_memory("N+1 fix", "use batched lookups", &["mongo", "redis", "cache"], vec![]))
            .await
            .unwrap();

        assert_eq!(saved.embedding, vec![0.25, 0.75]);
        assert_eq!(saved.tags, vec!["mongo", "redis", "cache"]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_save_survives_embedding_failure() {
        let (engine, db) = engine_with(
            Arc::new(StubEmbedder::always(EmbeddingOutcome::Failed("down".into()))),
            None,
        );

        let saved = engine.save(new_memory("t", "s", &[], vec![])).await.unwrap();
        assert!(saved.embedding.is_empty());
        assert_eq!(db.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_by_tag_normalizes_input_and_stats() {
        let (engine, db) = engine_with(
            Arc::new(StubEmbedder::always(EmbeddingOutcome::Empty)),
            None,
        );
        db.insert(new_memory("a", "x", &["redis"], vec![])).await.unwrap();
        db.insert(new_memory("b", "x", &["redis", "mongo"], vec![])).await.unwrap();

        let found = engine.by_tag("  #REDIS ", 20).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].title, "b");

        let stats = engine.stats(5).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.top_tags[0].tag, "redis");
        assert_eq!(stats.top_tags[0].count, 2);
    }
}
