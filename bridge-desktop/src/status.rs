//! Status sink that forwards engine status to `tracing`

use bridge_traits::status::{StatusSink, SyncState};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

/// Logs each status transition; desktop shells without a UI use this.
///
/// The last reported state is kept for polling via [`last_state`].
///
/// [`last_state`]: TracingStatusSink::last_state
#[derive(Debug, Default)]
pub struct TracingStatusSink {
    last: Mutex<Option<SyncState>>,
}

impl TracingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_state(&self) -> Option<SyncState> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusSink for TracingStatusSink {
    fn report_status(&self, state: SyncState, message: &str) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
        match state {
            SyncState::Error => error!(state = %state, "{}", message),
            SyncState::Warning => warn!(state = %state, "{}", message),
            _ => info!(state = %state, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_last_state() {
        let sink = TracingStatusSink::new();
        assert_eq!(sink.last_state(), None);

        sink.report_status(SyncState::Syncing, "Running sync");
        sink.report_status(SyncState::Warning, "1 item(s) could not be synced");
        assert_eq!(sink.last_state(), Some(SyncState::Warning));
    }
}
