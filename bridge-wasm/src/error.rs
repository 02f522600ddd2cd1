//! Error types for WebAssembly bridge implementations

use bridge_traits::error::BridgeError;
use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};

/// Result type for WebAssembly bridge operations
pub type WasmResult<T> = Result<T, WasmError>;

/// Errors raised while talking to browser or host JavaScript APIs
#[derive(Error, Debug)]
pub enum WasmError {
    /// JavaScript exception or rejected promise
    #[error("JavaScript error: {0}")]
    JavaScript(String),

    /// A browser global (window, localStorage) or host namespace is missing
    #[error("Not available: {0}")]
    NotAvailable(String),

    /// Value could not cross the JS boundary
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Host returned a value of the wrong shape
    #[error("Unexpected value from host: {0}")]
    UnexpectedValue(String),
}

impl WasmError {
    /// Attach a short description of the failing call to a JS error
    pub fn from_js(context: &str, err: JsValue) -> Self {
        WasmError::JavaScript(format!("{context}: {}", js_message(&err)))
    }
}

impl From<WasmError> for BridgeError {
    fn from(err: WasmError) -> Self {
        match err {
            WasmError::NotAvailable(what) => BridgeError::NotAvailable(what),
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

impl From<JsValue> for WasmError {
    fn from(js_value: JsValue) -> Self {
        WasmError::JavaScript(js_message(&js_value))
    }
}

impl From<serde_wasm_bindgen::Error> for WasmError {
    fn from(err: serde_wasm_bindgen::Error) -> Self {
        WasmError::Serialization(err.to_string())
    }
}

/// Best-effort readable message for a thrown JS value
pub(crate) fn js_message(err: &JsValue) -> String {
    if let Some(message) = err.as_string() {
        message
    } else if let Some(js_err) = err.dyn_ref::<js_sys::Error>() {
        js_err.message().into()
    } else {
        format!("{err:?}")
    }
}

/// Shorthand used by every adapter: JS failure in `context` as a bridge error
pub(crate) fn js_error(context: &str, err: JsValue) -> BridgeError {
    WasmError::from_js(context, err).into()
}
