//! WebAssembly Bridge Implementations
//!
//! Browser implementations of the traits defined in `bridge-traits`, built on
//! `web-sys` and `wasm-bindgen`:
//!
//! - [`WasmHttpClient`]: `fetch` with `AbortController` timeouts
//! - [`LocalStorageKeyValueStore`]: the extension's `localStorage` settings
//! - [`WasmRecordStore`]: delegates to a host-provided IndexedDB store
//! - [`JsStatusSink`]: forwards status changes to a JS callback
//!
//! # Platform Support
//!
//! This crate is designed exclusively for the `wasm32-unknown-unknown` target.
//! It compiles to nothing on native targets.
//!
//! # Examples
//!
//! ```ignore
//! use bridge_wasm::{build_wasm_bridges, WasmBridgeConfig};
//!
//! let bridges = build_wasm_bridges(
//!     WasmBridgeConfig::new("records").with_status_callback(on_status),
//! )?;
//! ```

#![cfg(target_arch = "wasm32")]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod database;
pub mod error;
pub mod http;
pub mod status;
pub mod storage;

pub use bootstrap::{build_wasm_bridges, WasmBridgeConfig, WasmBridgeSet};
pub use database::WasmRecordStore;
pub use error::{WasmError, WasmResult};
pub use http::WasmHttpClient;
pub use status::JsStatusSink;
pub use storage::LocalStorageKeyValueStore;
