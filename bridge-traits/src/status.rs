//! Status Reporting
//!
//! The UI collaborator (toolbar badge, modal, tray icon) owns rendering; the
//! core only tells it which state the sync machinery is in.

use serde::{Deserialize, Serialize};

use crate::platform::PlatformSendSync;

/// Sync state shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Nothing queued or running
    Idle,
    /// An operation is executing
    Syncing,
    /// Last operation finished without item failures
    Success,
    /// Last operation failed as a whole
    Error,
    /// Last operation finished but some items were skipped
    Warning,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Success => "success",
            SyncState::Error => "error",
            SyncState::Warning => "warning",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of status signals
///
/// Called from inside sync operations, so implementations must return
/// quickly (post a message, flip a CSS class) and never block.
pub trait StatusSink: PlatformSendSync {
    fn report_status(&self, state: SyncState, message: &str);
}

/// Status sink that discards every signal
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatusSink;

impl StatusSink for NoopStatusSink {
    fn report_status(&self, _state: SyncState, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&SyncState::Warning).unwrap(), "\"warning\"");
        let state: SyncState = serde_json::from_str("\"syncing\"").unwrap();
        assert_eq!(state, SyncState::Syncing);
    }

    #[test]
    fn test_display_matches_wire_name() {
        assert_eq!(SyncState::Idle.to_string(), "idle");
        assert_eq!(SyncState::Error.to_string(), "error");
    }
}
