//! ============================================================================
//! Conversation Input - Inbound events and their classification
//! ============================================================================
//! Transports reduce every user action to an `InboundEvent`
//! `{identity, kind, payload}`; `classify` turns it into an `Input` the
//! state machine understands.
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::access::UserId;

// Menu labels (reply keyboard)
pub const LABEL_SAVE: &str = "➕ Save solution";
pub const LABEL_QUERY: &str = "🔎 Ask memory";
pub const LABEL_RECENT: &str = "📚 Recent memories";
pub const LABEL_TAG_SEARCH: &str = "🏷️ Search by tag";
pub const LABEL_STATS: &str = "📊 Stats";
pub const LABEL_HELP: &str = "❓ Help";
pub const LABEL_CANCEL: &str = "❌ Cancel";

/// Sentinel typed at the tags prompt to save without tags
pub const NO_TAGS_SENTINEL: &str = "-";

/// What kind of user action produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A typed message (including menu keyboard presses)
    Text,
    /// An inline button press carrying an opaque payload
    Button,
}

/// A user action as seen by the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub identity: UserId,
    pub kind: EventKind,
    pub payload: String,
}

impl InboundEvent {
    pub fn text(identity: UserId, payload: impl Into<String>) -> Self {
        Self {
            identity,
            kind: EventKind::Text,
            payload: payload.into(),
        }
    }

    pub fn button(identity: UserId, payload: impl Into<String>) -> Self {
        Self {
            identity,
            kind: EventKind::Button,
            payload: payload.into(),
        }
    }
}

/// Global commands, available from any mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Save,
    Query,
    Recent,
    TagSearch,
    Stats,
    Cancel,
}

impl Command {
    /// Recognize a menu label or slash command
    pub fn from_text(text: &str) -> Option<Self> {
        let text = text.trim();

        if let Some(slash) = text.strip_prefix('/') {
            // "/start@my_bot payload" -> "start"
            let word = slash.split_whitespace().next().unwrap_or("");
            let word = word.split('@').next().unwrap_or("");
            return match word.to_lowercase().as_str() {
                "start" => Some(Command::Start),
                "help" => Some(Command::Help),
                "save" => Some(Command::Save),
                "query" | "ask" => Some(Command::Query),
                "recent" | "list" => Some(Command::Recent),
                "tag" | "tags" => Some(Command::TagSearch),
                "stats" => Some(Command::Stats),
                "cancel" => Some(Command::Cancel),
                _ => None,
            };
        }

        match text {
            LABEL_SAVE => Some(Command::Save),
            LABEL_QUERY => Some(Command::Query),
            LABEL_RECENT => Some(Command::Recent),
            LABEL_TAG_SEARCH => Some(Command::TagSearch),
            LABEL_STATS => Some(Command::Stats),
            LABEL_HELP => Some(Command::Help),
            LABEL_CANCEL => Some(Command::Cancel),
            _ => None,
        }
    }
}

/// Inline button payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    ConfirmSave,
    CancelSave,
    EditTitle,
    EditTags,
    View(String),
    Delete(String),
    ConfirmDelete(String),
    CancelDelete,
}

impl Signal {
    pub fn parse(payload: &str) -> Option<Self> {
        let (name, arg) = match payload.split_once(':') {
            Some((name, arg)) => (name, Some(arg.trim())),
            None => (payload, None),
        };

        let id = || arg.filter(|a| !a.is_empty()).map(str::to_string);

        match name.trim() {
            // Older previews sent "confirm_save:" with an empty id
            "confirm_save" => Some(Signal::ConfirmSave),
            "cancel_save" => Some(Signal::CancelSave),
            "edit_title" => Some(Signal::EditTitle),
            "edit_tags" => Some(Signal::EditTags),
            "view_full" => id().map(Signal::View),
            "delete" => id().map(Signal::Delete),
            "confirm_delete" => id().map(Signal::ConfirmDelete),
            "cancel_delete" => Some(Signal::CancelDelete),
            _ => None,
        }
    }

    /// Payload to attach to a button
    pub fn payload(&self) -> String {
        match self {
            Signal::ConfirmSave => "confirm_save".to_string(),
            Signal::CancelSave => "cancel_save".to_string(),
            Signal::EditTitle => "edit_title".to_string(),
            Signal::EditTags => "edit_tags".to_string(),
            Signal::View(id) => format!("view_full:{}", id),
            Signal::Delete(id) => format!("delete:{}", id),
            Signal::ConfirmDelete(id) => format!("confirm_delete:{}", id),
            Signal::CancelDelete => "cancel_delete".to_string(),
        }
    }
}

/// Classified user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Signal(Signal),
    /// Free text, trimmed
    Text(String),
    Unrecognized,
}

/// Classify a raw event payload
pub fn classify(kind: EventKind, payload: &str) -> Input {
    match kind {
        EventKind::Text => match Command::from_text(payload) {
            Some(command) => Input::Command(command),
            // Unknown slash commands are not free text
            None if payload.trim_start().starts_with('/') => Input::Unrecognized,
            None => Input::Text(payload.trim().to_string()),
        },
        EventKind::Button => Signal::parse(payload)
            .map(Input::Signal)
            .unwrap_or(Input::Unrecognized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_labels_and_slash_commands() {
        assert_eq!(Command::from_text(LABEL_SAVE), Some(Command::Save));
        assert_eq!(Command::from_text(" ❌ Cancel "), Some(Command::Cancel));
        assert_eq!(Command::from_text("/start"), Some(Command::Start));
        assert_eq!(Command::from_text("/help@recall_bot"), Some(Command::Help));
        assert_eq!(Command::from_text("/Stats now"), Some(Command::Stats));
        assert_eq!(Command::from_text("save"), None);
    }

    #[test]
    fn test_signal_payloads() {
        let id = "5b0c3e7e-2f1f-4a53-9d4e-2b1c2f5d6a7b".to_string();
        for signal in [
            Signal::ConfirmSave,
            Signal::CancelSave,
            Signal::EditTitle,
            Signal::EditTags,
            Signal::View(id.clone()),
            Signal::Delete(id.clone()),
            Signal::ConfirmDelete(id.clone()),
            Signal::CancelDelete,
        ] {
            assert_eq!(Signal::parse(&signal.payload()), Some(signal));
        }
    }

    #[test]
    fn test_signal_edge_cases() {
        assert_eq!(Signal::parse("confirm_save:"), Some(Signal::ConfirmSave));
        assert_eq!(Signal::parse("view_full:"), None);
        assert_eq!(Signal::parse("delete"), None);
        assert_eq!(Signal::parse("launch_rockets"), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(EventKind::Text, "  use batched lookups \n"),
            Input::Text("use batched lookups".into())
        );
        assert_eq!(classify(EventKind::Text, "/frobnicate"), Input::Unrecognized);
        assert_eq!(
            classify(EventKind::Text, LABEL_QUERY),
            Input::Command(Command::Query)
        );
        assert_eq!(
            classify(EventKind::Button, "cancel_delete"),
            Input::Signal(Signal::CancelDelete)
        );
        assert_eq!(classify(EventKind::Button, "???"), Input::Unrecognized);
    }
}
