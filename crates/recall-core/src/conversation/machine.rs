//! ============================================================================
//! Conversation Machine - Pure transition function
//! ============================================================================
//! `transition(mode, input)` decides what to do and where to go next. It
//! never touches storage; the `Assistant` executes the returned action.
//! ============================================================================

use super::input::{Command, Input, Signal, NO_TAGS_SENTINEL};
use super::state::Mode;
use crate::memory::parse_tags;

/// Work the assistant performs for a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `/start`: greet and reset
    Welcome,
    Help,
    /// Global cancel: clear draft and results
    Cancel,
    BeginSave,
    SetSolution(String),
    SetTitle(String),
    SetTags(Vec<String>),
    /// Persist the draft
    Persist,
    EditTitle,
    EditTags,
    DiscardDraft,
    BeginQuery,
    RunQuery(String),
    BeginTagSearch,
    RunTagSearch(String),
    ListRecent,
    ShowStats,
    View(String),
    StageDelete(String),
    ConfirmDelete(String),
    CancelDelete,
    /// Blank text where text is awaited
    Reprompt,
    /// A button from a flow that is no longer pending
    Stale,
    Unrecognized,
}

/// Outcome of one step of the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub action: Action,
    pub next: Mode,
}

impl Transition {
    fn to(action: Action, next: Mode) -> Self {
        Self { action, next }
    }

    fn stay(action: Action, mode: Mode) -> Self {
        Self { action, next: mode }
    }
}

/// Compute the next step for `input` in `mode`
pub fn transition(mode: Mode, input: &Input) -> Transition {
    match input {
        Input::Command(command) => on_command(mode, *command),
        Input::Signal(signal) => on_signal(mode, signal),
        Input::Text(text) => on_text(mode, text),
        Input::Unrecognized => Transition::stay(Action::Unrecognized, mode),
    }
}

fn on_command(mode: Mode, command: Command) -> Transition {
    match command {
        Command::Start => Transition::to(Action::Welcome, Mode::None),
        Command::Help => Transition::stay(Action::Help, mode),
        Command::Cancel => Transition::to(Action::Cancel, Mode::None),
        Command::Save => Transition::to(Action::BeginSave, Mode::SaveWaitText),
        Command::Query => Transition::to(Action::BeginQuery, Mode::QueryWaitText),
        Command::TagSearch => Transition::to(Action::BeginTagSearch, Mode::TagSearchWait),
        Command::Recent => Transition::to(Action::ListRecent, Mode::None),
        Command::Stats => Transition::to(Action::ShowStats, Mode::None),
    }
}

fn on_text(mode: Mode, text: &str) -> Transition {
    if mode.awaits_text() && text.trim().is_empty() {
        return Transition::stay(Action::Reprompt, mode);
    }

    let text = text.trim().to_string();
    match mode {
        Mode::SaveWaitText => Transition::to(Action::SetSolution(text), Mode::SaveWaitTitle),
        Mode::SaveWaitTitle => Transition::to(Action::SetTitle(text), Mode::SaveWaitTags),
        Mode::SaveWaitTags => {
            let tags = if text == NO_TAGS_SENTINEL {
                Vec::new()
            } else {
                parse_tags(&text)
            };
            Transition::to(Action::SetTags(tags), Mode::SaveConfirm)
        }
        Mode::QueryWaitText => Transition::to(Action::RunQuery(text), Mode::None),
        Mode::TagSearchWait => Transition::to(Action::RunTagSearch(text), Mode::None),
        Mode::None | Mode::SaveConfirm | Mode::DeleteConfirm => {
            Transition::stay(Action::Unrecognized, mode)
        }
    }
}

fn on_signal(mode: Mode, signal: &Signal) -> Transition {
    match (mode, signal) {
        (Mode::SaveConfirm, Signal::ConfirmSave) => Transition::to(Action::Persist, Mode::None),
        (Mode::SaveConfirm, Signal::CancelSave) => {
            Transition::to(Action::DiscardDraft, Mode::None)
        }
        (Mode::SaveConfirm, Signal::EditTitle) => {
            Transition::to(Action::EditTitle, Mode::SaveWaitTitle)
        }
        (Mode::SaveConfirm, Signal::EditTags) => {
            Transition::to(Action::EditTags, Mode::SaveWaitTags)
        }
        (_, Signal::View(id)) => Transition::stay(Action::View(id.clone()), mode),
        (_, Signal::Delete(id)) => {
            Transition::to(Action::StageDelete(id.clone()), Mode::DeleteConfirm)
        }
        (Mode::DeleteConfirm, Signal::ConfirmDelete(id)) => {
            Transition::to(Action::ConfirmDelete(id.clone()), Mode::None)
        }
        (Mode::DeleteConfirm, Signal::CancelDelete) => {
            Transition::to(Action::CancelDelete, Mode::None)
        }
        _ => Transition::stay(Action::Stale, mode),
    }
}
