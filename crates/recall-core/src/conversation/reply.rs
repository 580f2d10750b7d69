//! Structured replies handed to the transport.

use serde::{Deserialize, Serialize};

use super::input::{
    Signal, LABEL_CANCEL, LABEL_HELP, LABEL_QUERY, LABEL_RECENT, LABEL_SAVE, LABEL_STATS,
    LABEL_TAG_SEARCH,
};

/// Reply keyboard rows shown when no flow is running
pub const MAIN_MENU_ROWS: [&[&str]; 3] = [
    &[LABEL_SAVE, LABEL_QUERY],
    &[LABEL_RECENT, LABEL_TAG_SEARCH],
    &[LABEL_STATS, LABEL_HELP],
];

/// Reply keyboard rows shown while a flow waits for text
pub const CANCEL_MENU_ROWS: [&[&str]; 1] = [&[LABEL_CANCEL]];

/// An inline button: a label and the payload it sends back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub label: String,
    pub payload: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, signal: Signal) -> Self {
        Self {
            label: label.into(),
            payload: signal.payload(),
        }
    }
}

/// Keyboard attached to a reply
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Markup {
    MainMenu,
    CancelMenu,
    Inline(Vec<Vec<InlineButton>>),
    #[default]
    None,
}

/// One outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// HTML-formatted body
    pub text: String,
    pub markup: Markup,
    /// Replace the message the button was attached to instead of sending a
    /// new one
    pub edit: bool,
}

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Markup::None,
            edit: false,
        }
    }

    pub fn with_markup(mut self, markup: Markup) -> Self {
        self.markup = markup;
        self
    }

    pub fn main_menu(self) -> Self {
        self.with_markup(Markup::MainMenu)
    }

    pub fn cancel_menu(self) -> Self {
        self.with_markup(Markup::CancelMenu)
    }

    pub fn inline(self, rows: Vec<Vec<InlineButton>>) -> Self {
        self.with_markup(Markup::Inline(rows))
    }

    pub fn editing(mut self) -> Self {
        self.edit = true;
        self
    }
}
