//! ============================================================================
//! Access Gate - Admin identity check
//! ============================================================================

use tracing::debug;

/// Platform user identity
pub type UserId = i64;

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied,
}

/// Gate letting through a single configured identity
#[derive(Debug, Clone, Copy)]
pub struct AccessGate {
    admin_id: UserId,
}

impl AccessGate {
    /// An `admin_id` of 0 means "nobody": the gate denies everyone
    pub fn new(admin_id: UserId) -> Self {
        Self { admin_id }
    }

    pub fn check(&self, identity: UserId) -> Access {
        if self.admin_id != 0 && identity == self.admin_id {
            Access::Granted
        } else {
            debug!("Ignoring interaction from unauthorized user {}", identity);
            Access::Denied
        }
    }
}
