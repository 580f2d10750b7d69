//! ============================================================================
//! Database Types - Serializable records for redb storage
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::Memory;

/// Memory as stored in the `memories` table.
/// Timestamps are kept as microseconds so the record stays bincode-friendly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    /// Insertion sequence, breaks ties between equal timestamps
    pub seq: u64,
    pub title: String,
    pub solution: String,
    pub tags: Vec<String>,
    pub context: String,
    pub code: String,
    pub embedding: Vec<f32>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl MemoryRecord {
    /// Sort key for "most recent first" listings
    pub fn recency_key(&self) -> (i64, u64) {
        (self.created_at_us, self.seq)
    }

    pub fn into_memory(self) -> Memory {
        Memory {
            id: self.id,
            title: self.title,
            solution: self.solution,
            tags: self.tags,
            context: self.context,
            code: self.code,
            embedding: self.embedding,
            created_at: from_micros(self.created_at_us),
            updated_at: from_micros(self.updated_at_us),
        }
    }
}

fn from_micros(us: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(us).unwrap_or_default()
}
