//! Test doubles for the embedding provider and vector index.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::db::MemoryDb;
use crate::memory::{
    cosine_similarity, normalized_score, EmbeddingOutcome, Embedder, NewMemory, RetrievalEngine,
    VectorIndex,
};

/// Embedder answering from a fixed table; unknown text gets `fallback`
pub struct StubEmbedder {
    table: HashMap<String, Vec<f32>>,
    fallback: EmbeddingOutcome,
    pub calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn always(outcome: EmbeddingOutcome) -> Self {
        Self {
            table: HashMap::new(),
            fallback: outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> EmbeddingOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.table.get(text.trim()) {
            Some(v) => EmbeddingOutcome::Vector(v.clone()),
            None => self.fallback.clone(),
        }
    }
}

/// In-process index that can be switched into a failing state
#[derive(Default)]
pub struct FlakyIndex {
    pub down: AtomicBool,
    vectors: tokio::sync::Mutex<Vec<(String, Vec<f32>)>>,
}

impl FlakyIndex {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.vectors.lock().await.len()
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(anyhow!("index offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    async fn upsert(&self, id: &str, vector: &[f32]) -> Result<()> {
        self.check()?;
        let mut vectors = self.vectors.lock().await;
        vectors.retain(|(v, _)| v != id);
        vectors.push((id.to_string(), vector.to_vec()));
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        _candidate_pool: usize,
        limit: usize,
    ) -> Result<Vec<(String, f32)>> {
        self.check()?;
        let vectors = self.vectors.lock().await;
        let mut hits: Vec<(String, f32)> = vectors
            .iter()
            .filter_map(|(id, v)| Some((id.clone(), normalized_score(cosine_similarity(vector, v)?))))
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.check()?;
        self.vectors.lock().await.retain(|(v, _)| v != id);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.check().is_ok())
    }
}

pub fn new_memory(title: &str, solution: &str, tags: &[&str], embedding: Vec<f32>) -> NewMemory {
    NewMemory {
        title: title.to_string(),
        solution: solution.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        context: String::new(),
        code: String::new(),
        embedding,
    }
}

/// Engine over an in-memory database with the given embedder and index
pub fn engine_with(
    embedder: Arc<dyn Embedder>,
    index: Option<Arc<FlakyIndex>>,
) -> (RetrievalEngine, Arc<MemoryDb>) {
    let mut db = MemoryDb::in_memory().expect("in-memory db");
    if let Some(index) = index {
        db = db.with_index(index);
    }
    let db = Arc::new(db);
    (RetrievalEngine::new(db.clone(), embedder), db)
}
