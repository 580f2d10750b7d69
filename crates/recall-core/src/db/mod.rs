// ============================================================================
// MemoryDb - Embedded Memory Database (redb)
// ============================================================================
// Durable storage for saved memories and their embeddings.
// Ids whose vector-index entry may be stale are kept in `index_pending`
// until the attached index has caught up.
// Default path: ~/.recall/memories.redb (override via RECALL_DB_PATH env var)
// ============================================================================

pub mod types;

pub use types::MemoryRecord;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::memory::{
    cosine_similarity, normalized_score, Memory, MemoryStore, NewMemory, SearchHit, StoreError,
    StoreResult, TagCount, VectorIndex,
};

// Table definitions
const MEMORIES: TableDefinition<&str, &[u8]> = TableDefinition::new("memories");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");
const INDEX_PENDING: TableDefinition<&str, u8> = TableDefinition::new("index_pending");

const SEQ_KEY: &str = "next_seq";

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn serialization(e: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(e.to_string())
}

/// Embedded database of memories, optionally paired with an external
/// vector index
pub struct MemoryDb {
    db: Database,
    path: Option<PathBuf>,
    index: Option<Arc<dyn VectorIndex>>,
}

impl MemoryDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses RECALL_DB_PATH env var or ~/.recall/memories.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("RECALL_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let recall_dir = home.join(".recall");
            std::fs::create_dir_all(&recall_dir)
                .map_err(|e| anyhow!("Failed to create .recall directory: {}", e))?;
            recall_dir.join("memories.redb")
        };

        info!("Opening database at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;

        Self::init(db, Some(db_path))
    }

    /// Database that lives only in memory (tests, dry runs)
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| anyhow!("Failed to create in-memory database: {}", e))?;

        Self::init(db, None)
    }

    fn init(db: Database, path: Option<PathBuf>) -> Result<Self> {
        // Ensure tables exist by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(MEMORIES)
                .map_err(|e| anyhow!("Failed to create memories table: {}", e))?;
            let _ = write_txn
                .open_table(META)
                .map_err(|e| anyhow!("Failed to create meta table: {}", e))?;
            let _ = write_txn
                .open_table(INDEX_PENDING)
                .map_err(|e| anyhow!("Failed to create index_pending table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        debug!("Database ready");

        Ok(Self {
            db,
            path,
            index: None,
        })
    }

    /// Route vector queries to an external index instead of scanning.
    /// Memories the index has not seen yet are pushed by `sync_index`.
    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Get the database file path (None for in-memory databases)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Every memory, most recent first
    pub fn list_all(&self) -> StoreResult<Vec<Memory>> {
        Ok(self
            .load_records()?
            .into_iter()
            .map(MemoryRecord::into_memory)
            .collect())
    }

    /// Load every record, most recent first
    fn load_records(&self) -> StoreResult<Vec<MemoryRecord>> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(MEMORIES).map_err(backend)?;

        let mut records = Vec::new();
        for entry in table.range::<&str>(..).map_err(backend)? {
            let (_key, value) = entry.map_err(backend)?;
            let record: MemoryRecord =
                bincode::deserialize(value.value()).map_err(serialization)?;
            records.push(record);
        }

        records.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
        Ok(records)
    }

    fn get_record(&self, id: &str) -> StoreResult<Option<MemoryRecord>> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(MEMORIES).map_err(backend)?;

        match table.get(id).map_err(backend)? {
            Some(value) => {
                let record: MemoryRecord =
                    bincode::deserialize(value.value()).map_err(serialization)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn write_record(&self, new: NewMemory) -> StoreResult<MemoryRecord> {
        let now = chrono::Utc::now().timestamp_micros();
        let id = Uuid::new_v4().to_string();

        let write_txn = self.db.begin_write().map_err(backend)?;
        let record;
        {
            let mut meta = write_txn.open_table(META).map_err(backend)?;
            let seq = meta
                .get(SEQ_KEY)
                .map_err(backend)?
                .map(|v| v.value())
                .unwrap_or(0);
            meta.insert(SEQ_KEY, seq + 1).map_err(backend)?;

            record = MemoryRecord {
                id,
                seq,
                title: new.title,
                solution: new.solution,
                tags: new.tags,
                context: new.context,
                code: new.code,
                embedding: new.embedding,
                created_at_us: now,
                updated_at_us: now,
            };
            let value = bincode::serialize(&record).map_err(serialization)?;

            let mut table = write_txn.open_table(MEMORIES).map_err(backend)?;
            table
                .insert(record.id.as_str(), value.as_slice())
                .map_err(backend)?;

            if !record.embedding.is_empty() {
                let mut pending = write_txn.open_table(INDEX_PENDING).map_err(backend)?;
                pending.insert(record.id.as_str(), 0u8).map_err(backend)?;
            }
        }
        write_txn.commit().map_err(backend)?;

        Ok(record)
    }

    fn remove_record(&self, id: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write().map_err(backend)?;
        let removed;
        {
            let mut table = write_txn.open_table(MEMORIES).map_err(backend)?;
            removed = table.remove(id).map_err(backend)?.is_some();

            if removed {
                let mut pending = write_txn.open_table(INDEX_PENDING).map_err(backend)?;
                pending.insert(id, 0u8).map_err(backend)?;
            }
        }
        write_txn.commit().map_err(backend)?;
        Ok(removed)
    }

    fn pending_ids(&self) -> StoreResult<Vec<String>> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(INDEX_PENDING).map_err(backend)?;

        let mut ids = Vec::new();
        for entry in table.range::<&str>(..).map_err(backend)? {
            let (key, _) = entry.map_err(backend)?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    fn clear_pending(&self, id: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = write_txn.open_table(INDEX_PENDING).map_err(backend)?;
            table.remove(id).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;
        Ok(())
    }

    /// Push pending upserts and removals into the attached index, in id
    /// order, stopping at the first index failure. Returns how many ids are
    /// still pending (all of them when no index is attached).
    pub async fn sync_index(&self) -> StoreResult<usize> {
        let pending = self.pending_ids()?;
        let Some(index) = &self.index else {
            return Ok(pending.len());
        };

        let mut synced = 0;
        for id in &pending {
            let result = match self.get_record(id)? {
                Some(record) if !record.embedding.is_empty() => {
                    index.upsert(id, &record.embedding).await
                }
                Some(_) => Ok(()),
                None => index.remove(id).await,
            };
            if let Err(e) = result {
                warn!("Vector index sync stopped at {}: {}", id, e);
                break;
            }
            self.clear_pending(id)?;
            synced += 1;
        }

        if synced > 0 {
            info!("Synced {} memories into the vector index", synced);
        }
        Ok(pending.len() - synced)
    }

    /// Exhaustive cosine scan over every memory whose embedding matches the
    /// query dimension
    fn flat_search(&self, vector: &[f32], limit: usize) -> StoreResult<Vec<SearchHit>> {
        let mut scored: Vec<(f32, MemoryRecord)> = self
            .load_records()?
            .into_iter()
            .filter(|r| r.embedding.len() == vector.len())
            .filter_map(|r| {
                let cosine = cosine_similarity(vector, &r.embedding)?;
                Some((normalized_score(cosine), r))
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, r)| SearchHit::scored(r.into_memory(), score))
            .collect())
    }

    async fn indexed_search(
        &self,
        index: &dyn VectorIndex,
        vector: &[f32],
        candidate_pool: usize,
        limit: usize,
    ) -> StoreResult<Vec<SearchHit>> {
        // Ask for the whole pool so vectors of deleted memories cannot
        // crowd out live ones
        let ids = index
            .search(vector, candidate_pool, candidate_pool)
            .await
            .map_err(|e| StoreError::VectorIndex(e.to_string()))?;

        let mut hits = Vec::with_capacity(limit);
        for (id, score) in ids {
            if hits.len() == limit {
                break;
            }
            match self.get_record(&id)? {
                Some(record) => hits.push(SearchHit::scored(record.into_memory(), score)),
                None => debug!("Index returned {} which is no longer stored", id),
            }
        }
        Ok(hits)
    }
}

/// Ids are UUID strings; anything else can never be stored
fn is_valid_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

#[async_trait]
impl MemoryStore for MemoryDb {
    async fn insert(&self, memory: NewMemory) -> StoreResult<Memory> {
        let record = self.write_record(memory)?;
        info!("Stored memory {} ({})", record.id, record.title);

        if let Some(index) = &self.index {
            if !record.embedding.is_empty() {
                match index.upsert(&record.id, &record.embedding).await {
                    Ok(()) => {
                        if let Err(e) = self.clear_pending(&record.id) {
                            warn!("Memory {} indexed but still marked pending: {}", record.id, e);
                        }
                    }
                    Err(e) => warn!("Memory {} saved but not indexed yet: {}", record.id, e),
                }
            }
        }

        Ok(record.into_memory())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Memory>> {
        if !is_valid_id(id) {
            debug!("Lookup with malformed id {:?}", id);
            return Ok(None);
        }
        Ok(self.get_record(id)?.map(MemoryRecord::into_memory))
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<bool> {
        if !is_valid_id(id) {
            debug!("Delete with malformed id {:?}", id);
            return Ok(false);
        }

        let removed = self.remove_record(id)?;
        if removed {
            info!("Deleted memory {}", id);
            if let Some(index) = &self.index {
                match index.remove(id).await {
                    Ok(()) => {
                        if let Err(e) = self.clear_pending(id) {
                            warn!("Memory {} unindexed but still marked pending: {}", id, e);
                        }
                    }
                    Err(e) => warn!("Memory {} deleted but still indexed: {}", id, e),
                }
            }
        }
        Ok(removed)
    }

    async fn find_recent(&self, limit: usize) -> StoreResult<Vec<Memory>> {
        Ok(self
            .load_records()?
            .into_iter()
            .take(limit)
            .map(MemoryRecord::into_memory)
            .collect())
    }

    async fn find_by_tag(&self, tag: &str, limit: usize) -> StoreResult<Vec<Memory>> {
        let tag = tag.to_lowercase();
        Ok(self
            .load_records()?
            .into_iter()
            .filter(|r| r.tags.iter().any(|t| *t == tag))
            .take(limit)
            .map(MemoryRecord::into_memory)
            .collect())
    }

    async fn vector_search(
        &self,
        vector: &[f32],
        candidate_pool: usize,
        limit: usize,
    ) -> StoreResult<Vec<SearchHit>> {
        if vector.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let candidate_pool = candidate_pool.max(limit);

        match &self.index {
            Some(index) => {
                if self.sync_index().await? > 0 {
                    debug!("Vector index is behind the store, scanning instead");
                    return self.flat_search(vector, limit);
                }
                self.indexed_search(index.as_ref(), vector, candidate_pool, limit)
                    .await
            }
            None => self.flat_search(vector, limit),
        }
    }

    async fn text_search(&self, substring: &str, limit: usize) -> StoreResult<Vec<Memory>> {
        let needle = substring.to_lowercase();
        Ok(self
            .load_records()?
            .into_iter()
            .map(MemoryRecord::into_memory)
            .filter(|m| m.matches_keyword(&needle))
            .take(limit)
            .collect())
    }

    async fn aggregate_tag_counts(&self, top_n: usize) -> StoreResult<Vec<TagCount>> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for record in self.load_records()? {
            for tag in record.tags {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }

        let mut counts: Vec<TagCount> = counts
            .into_iter()
            .map(|(tag, count)| TagCount { tag, count })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        counts.truncate(top_n);
        Ok(counts)
    }

    async fn count_all(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(MEMORIES).map_err(backend)?;
        let count = table.range::<&str>(..).map_err(backend)?.count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::CANDIDATE_POOL;
    use crate::test_support::{new_memory, FlakyIndex};

    #[tokio::test]
    async fn test_insert_and_find() {
        let db = MemoryDb::in_memory().unwrap();
        let saved = db
            .insert(new_memory("N+1 fix", "use batched lookups", &["mongo"], vec![]))
            .await
            .unwrap();

        assert!(Uuid::parse_str(&saved.id).is_ok());
        assert_eq!(saved.created_at, saved.updated_at);

        let found = db.find_by_id(&saved.id).await.unwrap().unwrap();
        assert_eq!(found, saved);
    }

    #[tokio::test]
    async fn test_malformed_id_is_not_found() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(new_memory("a", "b", &[], vec![])).await.unwrap();

        assert!(db.find_by_id("not-an-id").await.unwrap().is_none());
        assert!(!db.delete_by_id("not-an-id").await.unwrap());
        assert_eq!(db.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_keeps_count() {
        let db = MemoryDb::in_memory().unwrap();
        let saved = db.insert(new_memory("a", "b", &[], vec![])).await.unwrap();

        let missing = Uuid::new_v4().to_string();
        assert!(!db.delete_by_id(&missing).await.unwrap());
        assert_eq!(db.count_all().await.unwrap(), 1);

        assert!(db.delete_by_id(&saved.id).await.unwrap());
        assert_eq!(db.count_all().await.unwrap(), 0);
        assert!(db.find_by_id(&saved.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let db = MemoryDb::in_memory().unwrap();
        for title in ["first", "second", "third"] {
            db.insert(new_memory(title, "x", &[], vec![])).await.unwrap();
        }

        let titles: Vec<String> = db
            .find_recent(2)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["third", "second"]);
    }

    #[tokio::test]
    async fn test_find_by_tag_exact_match() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(new_memory("old", "x", &["redis", "cache"], vec![])).await.unwrap();
        db.insert(new_memory("near miss", "x", &["redis-cluster"], vec![])).await.unwrap();
        db.insert(new_memory("new", "x", &["redis"], vec![])).await.unwrap();

        let found = db.find_by_tag("Redis", 20).await.unwrap();
        let titles: Vec<&str> = found.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "old"]);
        assert!(found.iter().all(|m| m.has_tag("redis")));
    }

    #[tokio::test]
    async fn test_text_search_is_case_insensitive() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(new_memory("Caching issue", "x", &[], vec![])).await.unwrap();
        db.insert(new_memory("other", "fixed the CACHING bug", &[], vec![])).await.unwrap();
        db.insert(new_memory("tagged", "x", &["caching"], vec![])).await.unwrap();
        db.insert(new_memory("unrelated", "x", &["db"], vec![])).await.unwrap();

        let found = db.text_search("caching", 10).await.unwrap();
        let titles: Vec<&str> = found.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["tagged", "other", "Caching issue"]);

        assert_eq!(db.text_search("caching", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tag_counts() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(new_memory("a", "x", &["rust", "db"], vec![])).await.unwrap();
        db.insert(new_memory("b", "x", &["rust"], vec![])).await.unwrap();
        db.insert(new_memory("c", "x", &["async", "db", "rust"], vec![])).await.unwrap();

        let counts = db.aggregate_tag_counts(2).await.unwrap();
        assert_eq!(
            counts,
            vec![
                TagCount { tag: "rust".into(), count: 3 },
                TagCount { tag: "db".into(), count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_flat_vector_search_scores_and_orders() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(new_memory("east", "x", &[], vec![1.0, 0.0])).await.unwrap();
        db.insert(new_memory("north", "x", &[], vec![0.0, 1.0])).await.unwrap();
        db.insert(new_memory("no vector", "x", &[], vec![])).await.unwrap();

        let hits = db.vector_search(&[0.9, 0.1], 100, 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].memory.title, "east");
        let top = hits[0].score.unwrap();
        assert!(top > hits[1].score.unwrap());
        assert!((0.0..=1.0).contains(&top));
        assert!(hits[0].memory.embedding.is_empty());
    }

    #[tokio::test]
    async fn test_indexed_search_and_index_failure() {
        let index = Arc::new(FlakyIndex::default());
        let db = MemoryDb::in_memory().unwrap().with_index(index.clone());

        let saved = db.insert(new_memory("east", "x", &[], vec![1.0, 0.0])).await.unwrap();
        let hits = db.vector_search(&[1.0, 0.0], 100, 5).await.unwrap();
        assert_eq!(hits[0].memory.id, saved.id);

        index.set_down(true);
        let err = db.vector_search(&[1.0, 0.0], 100, 5).await.unwrap_err();
        assert!(matches!(err, StoreError::VectorIndex(_)));

        // Saving still works while the index is down
        db.insert(new_memory("west", "x", &[], vec![-1.0, 0.0])).await.unwrap();
        assert_eq!(db.count_all().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_flat_search_scans_past_candidate_pool() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(new_memory("caching fix", "x", &[], vec![1.0, 0.0])).await.unwrap();
        for i in 0..CANDIDATE_POOL + 5 {
            db.insert(new_memory(&format!("unrelated {}", i), "x", &[], vec![0.0, 1.0]))
                .await
                .unwrap();
        }

        let hits = db.vector_search(&[1.0, 0.0], CANDIDATE_POOL, 5).await.unwrap();
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0].memory.title, "caching fix");
        assert!((hits[0].score.unwrap() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_index_catches_up_after_outage() {
        let index = Arc::new(FlakyIndex::default());
        let db = MemoryDb::in_memory().unwrap().with_index(index.clone());

        index.set_down(true);
        let saved = db.insert(new_memory("caching fix", "x", &[], vec![1.0, 0.0])).await.unwrap();
        assert_eq!(db.sync_index().await.unwrap(), 1);

        // Still found while the index lags behind
        let hits = db.vector_search(&[1.0, 0.0], 100, 5).await.unwrap();
        assert_eq!(hits[0].memory.id, saved.id);

        index.set_down(false);
        let hits = db.vector_search(&[1.0, 0.0], 100, 5).await.unwrap();
        assert_eq!(hits[0].memory.id, saved.id);
        assert_eq!(index.len().await, 1);
        assert_eq!(db.sync_index().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memories_saved_without_index_are_backfilled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.redb");
        let path = path.to_str().unwrap();

        let (kept, gone) = {
            let db = MemoryDb::open(Some(path)).unwrap();
            let kept = db.insert(new_memory("kept", "x", &[], vec![1.0, 0.0])).await.unwrap();
            let gone = db.insert(new_memory("gone", "x", &[], vec![0.9, 0.1])).await.unwrap();
            db.insert(new_memory("no vector", "x", &[], vec![])).await.unwrap();
            (kept.id, gone.id)
        };

        // A vector left behind by a delete made without the index
        let index = Arc::new(FlakyIndex::default());
        index.upsert(&gone, &[0.9, 0.1]).await.unwrap();
        {
            let db = MemoryDb::open(Some(path)).unwrap();
            assert!(db.delete_by_id(&gone).await.unwrap());
        }

        let db = MemoryDb::open(Some(path)).unwrap().with_index(index.clone());
        assert_eq!(db.sync_index().await.unwrap(), 0);
        assert_eq!(index.len().await, 1);

        let hits = db.vector_search(&[1.0, 0.0], 100, 5).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.memory.id.as_str()).collect();
        assert_eq!(ids, vec![kept.as_str()]);
    }

    #[tokio::test]
    async fn test_reopen_keeps_memories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.redb");
        let path = path.to_str().unwrap();

        let id = {
            let db = MemoryDb::open(Some(path)).unwrap();
            db.insert(new_memory("durable", "x", &["disk"], vec![0.5]))
                .await
                .unwrap()
                .id
        };

        let db = MemoryDb::open(Some(path)).unwrap();
        let found = db.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(found.title, "durable");
        assert_eq!(found.embedding, vec![0.5]);

        // Sequence survives the reopen
        db.insert(new_memory("later", "x", &[], vec![])).await.unwrap();
        assert_eq!(db.find_recent(1).await.unwrap()[0].title, "later");
    }
}
