//! Status sink that forwards engine status to a JavaScript callback

use bridge_traits::status::{StatusSink, SyncState};
use js_sys::Function;
use tracing::warn;
use wasm_bindgen::JsValue;

use crate::error::js_message;

/// Calls `callback(state, message)` for every status change
///
/// `state` is one of `"idle"`, `"syncing"`, `"success"`, `"error"`,
/// `"warning"`. The popup typically uses it to swap the toolbar icon.
/// A throwing callback is logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct JsStatusSink {
    callback: Function,
}

impl JsStatusSink {
    /// Wrap a `(state, message)` callback
    pub fn new(callback: Function) -> Self {
        Self { callback }
    }
}

impl StatusSink for JsStatusSink {
    fn report_status(&self, state: SyncState, message: &str) {
        let result = self.callback.call2(
            &JsValue::NULL,
            &JsValue::from_str(state.as_str()),
            &JsValue::from_str(message),
        );
        if let Err(err) = result {
            warn!(state = %state, "Status callback threw: {}", js_message(&err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn forwards_state_and_message() {
        let seen = js_sys::Array::new();
        let callback = Function::new_with_args(
            "state, message",
            "this.push(state + ':' + message)",
        )
        .bind(&seen);

        let sink = JsStatusSink::new(callback);
        sink.report_status(SyncState::Syncing, "Running sync");
        sink.report_status(SyncState::Idle, "");

        assert_eq!(seen.get(0).as_string().unwrap(), "syncing:Running sync");
        assert_eq!(seen.get(1).as_string().unwrap(), "idle:");
    }

    #[wasm_bindgen_test]
    fn throwing_callback_is_swallowed() {
        let sink = JsStatusSink::new(Function::new_no_args("throw new Error('boom')"));
        sink.report_status(SyncState::Error, "failed");
    }
}
