//! ============================================================================
//! Access Module - Single-owner authorization
//! ============================================================================
//! The assistant serves exactly one configured identity. Every interaction
//! passes through the gate before it can read or change any session.
//!
//! ## Usage
//! ```rust,ignore
//! use recall_core::access::{Access, AccessGate};
//!
//! let gate = AccessGate::new(admin_id);
//! if gate.check(update_user_id) == Access::Denied {
//!     return;
//! }
//! ```
//! ============================================================================

mod gate;

// Re-export public types
pub use gate::{Access, AccessGate, UserId};
