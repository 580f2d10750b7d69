//! ============================================================================
//! Conversation State - Per-user mode, draft and last results
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::memory::{MemoryDraft, SearchHit};

/// Where a user currently is in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    None,
    SaveWaitText,
    SaveWaitTitle,
    SaveWaitTags,
    SaveConfirm,
    QueryWaitText,
    TagSearchWait,
    DeleteConfirm,
}

impl Mode {
    /// Modes in which the next free text is consumed as input
    pub fn awaits_text(&self) -> bool {
        matches!(
            self,
            Mode::SaveWaitText
                | Mode::SaveWaitTitle
                | Mode::SaveWaitTags
                | Mode::QueryWaitText
                | Mode::TagSearchWait
        )
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Mode::None => "none",
            Mode::SaveWaitText => "save_wait_text",
            Mode::SaveWaitTitle => "save_wait_title",
            Mode::SaveWaitTags => "save_wait_tags",
            Mode::SaveConfirm => "save_confirm",
            Mode::QueryWaitText => "query_wait_text",
            Mode::TagSearchWait => "tag_search_wait",
            Mode::DeleteConfirm => "delete_confirm",
        };
        f.write_str(name)
    }
}

/// Pending work attached to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Draft {
    /// A memory being composed
    Memory(MemoryDraft),
    /// A memory waiting for delete confirmation
    Delete { id: String },
}

/// Transient state of one user's conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub mode: Mode,
    pub draft: Option<Draft>,
    pub last_results: Vec<SearchHit>,
}

impl Session {
    /// Back to `None` with nothing pending
    pub fn reset(&mut self) {
        self.mode = Mode::None;
        self.draft = None;
        self.last_results.clear();
    }

    /// Apply `f` to the memory draft, starting an empty one if something
    /// else (or nothing) was pending
    pub fn update_memory_draft<R>(&mut self, f: impl FnOnce(&mut MemoryDraft) -> R) -> R {
        let mut draft = match self.draft.take() {
            Some(Draft::Memory(draft)) => draft,
            _ => MemoryDraft::default(),
        };
        let result = f(&mut draft);
        self.draft = Some(Draft::Memory(draft));
        result
    }

    pub fn memory_draft(&self) -> Option<&MemoryDraft> {
        match &self.draft {
            Some(Draft::Memory(draft)) => Some(draft),
            _ => None,
        }
    }

    /// Id staged for deletion, if any
    pub fn staged_delete(&self) -> Option<&str> {
        match &self.draft {
            Some(Draft::Delete { id }) => Some(id),
            _ => None,
        }
    }

    /// Idle sessions carry no mode, draft or results
    pub fn is_idle(&self) -> bool {
        self.mode == Mode::None && self.draft.is_none() && self.last_results.is_empty()
    }
}
