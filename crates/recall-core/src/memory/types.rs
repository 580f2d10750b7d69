//! ============================================================================
//! Memory Types - Data structures for saved solutions
//! ============================================================================
//! Defines the persisted memory record, the draft the conversation builds,
//! search projections, and the tag helpers shared by every layer.
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title used when a memory is saved without one
pub const UNTITLED: &str = "(untitled)";

/// Separator between tags in user input and canonical text
pub const TAG_SEPARATOR: char = ',';

/// A single saved solution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Opaque identifier assigned by the store
    pub id: String,
    /// Short human label
    pub title: String,
    /// Primary body, never empty
    pub solution: String,
    /// Lower-cased tags in insertion order
    pub tags: Vec<String>,
    /// Optional background for the solution
    #[serde(default)]
    pub context: String,
    /// Optional code snippet
    #[serde(default)]
    pub code: String,
    /// Vector embedding (empty when generation failed)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Check whether the memory carries exactly this (already normalized) tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Case-insensitive substring match against title, solution or any tag.
    /// `needle` must already be lower-cased.
    pub fn matches_keyword(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.solution.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.contains(needle))
    }

    /// Copy without the embedding, for search projections
    pub fn without_embedding(mut self) -> Self {
        self.embedding = Vec::new();
        self
    }
}

/// Fields of a memory that is about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub title: String,
    pub solution: String,
    pub tags: Vec<String>,
    pub context: String,
    pub code: String,
    pub embedding: Vec<f32>,
}

/// A memory under construction by the conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryDraft {
    pub solution: Option<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub context: Option<String>,
    pub code: Option<String>,
}

impl MemoryDraft {
    /// Title as it will be stored
    pub fn display_title(&self) -> &str {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => UNTITLED,
        }
    }

    /// Finalize the draft. Returns `None` if there is no solution yet.
    pub fn into_new_memory(self) -> Option<NewMemory> {
        let title = self.display_title().to_string();
        let solution = self.solution.filter(|s| !s.trim().is_empty())?;

        Some(NewMemory {
            title,
            solution,
            tags: self.tags,
            context: self.context.unwrap_or_default(),
            code: self.code.unwrap_or_default(),
            embedding: Vec::new(),
        })
    }
}

/// A memory returned by a search, with the similarity score when the
/// result came from vector search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub memory: Memory,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub score: Option<f32>,
}

impl SearchHit {
    pub fn scored(memory: Memory, score: f32) -> Self {
        Self {
            memory: memory.without_embedding(),
            score: Some(score),
        }
    }

    pub fn unscored(memory: Memory) -> Self {
        Self {
            memory: memory.without_embedding(),
            score: None,
        }
    }
}

/// Usage count of a single tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

/// Collection statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: u64,
    pub top_tags: Vec<TagCount>,
}

/// Split user input into tags: comma separated, trimmed, `#` removed,
/// lower-cased, empty pieces dropped. Order is kept and duplicates are not
/// collapsed.
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(TAG_SEPARATOR)
        .map(normalize_tag)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Normalize a single tag typed by the user
pub fn normalize_tag(raw: &str) -> String {
    raw.replace('#', "").trim().to_lowercase()
}

/// Canonical text that gets embedded for a memory
pub fn embedding_text(title: &str, tags: &[String], solution: &str, context: &str) -> String {
    format!(
        "Title: {}\nTags: {}\nSolution: {}\nContext: {}",
        title,
        tags.join(", "),
        solution,
        context
    )
    .trim()
    .to_string()
}
