//! ============================================================================
//! Conversation Module - Per-user state machine over the retrieval engine
//! ============================================================================
//! Every user action arrives as an `InboundEvent` and leaves as a list of
//! `Reply`s. In between:
//!
//! ```text
//! InboundEvent → AccessGate → classify → transition(mode, input)
//!                                              │
//!                                        Action + next Mode
//!                                              ↓
//!                          Assistant::execute (store / engine calls)
//!                                              ↓
//!                                      render → Vec<Reply>
//! ```
//!
//! `transition` is pure; all I/O lives in the `Assistant`.
//! ============================================================================

mod assistant;
mod input;
mod machine;
pub mod render;
mod reply;
mod state;

// Re-export public types
pub use assistant::Assistant;
pub use input::{
    classify, Command, EventKind, InboundEvent, Input, Signal, LABEL_CANCEL, LABEL_HELP,
    LABEL_QUERY, LABEL_RECENT, LABEL_SAVE, LABEL_STATS, LABEL_TAG_SEARCH, NO_TAGS_SENTINEL,
};
pub use machine::{transition, Action, Transition};
pub use reply::{InlineButton, Markup, Reply, CANCEL_MENU_ROWS, MAIN_MENU_ROWS};
pub use state::{Draft, Mode, Session};
