//! # Host Bridge Traits
//!
//! Capability contracts that a host (browser extension shell, desktop app,
//! test harness) must satisfy before the sync engine can run.
//!
//! ## Overview
//!
//! The sync core never talks to `localStorage`, IndexedDB, S3 or Google Drive
//! directly. Each of those collaborators is described here as a trait and
//! injected at construction time, so the same engine runs natively (Tokio) and
//! in the browser (`wasm32`).
//!
//! ## Traits
//!
//! ### Storage
//! - [`ObjectStore`](storage::ObjectStore) - Remote blob store (put/get/list/delete)
//! - [`KeyValueStore`](storage::KeyValueStore) - Synchronous flat settings storage
//! - [`RecordStore`](storage::RecordStore) - Async structured store keyed by id
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by HTTP-backed object stores
//!
//! ### Host Integration
//! - [`StatusSink`](status::StatusSink) - Receives idle/syncing/success/error/warning signals
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | Web      | `bridge-wasm`       | ✅ Available |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep messages actionable
//! (include the key or path involved).
//!
//! ## Thread Safety
//!
//! Bridge traits are bounded by [`PlatformSendSync`](platform::PlatformSendSync):
//! `Send + Sync` natively, no bound on `wasm32` where browser handles are not
//! thread-safe.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::storage::{ObjectStore, ObjectInfo};
//! use bridge_traits::error::Result;
//! use bytes::Bytes;
//!
//! async fn upload_manifest(store: &dyn ObjectStore, body: Vec<u8>) -> Result<()> {
//!     store.put("metadata.json", Bytes::from(body), "application/json").await
//! }
//! ```

pub mod error;
pub mod http;
pub mod platform;
pub mod status;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use platform::{PlatformSend, PlatformSendSync};
pub use status::{NoopStatusSink, StatusSink, SyncState};
pub use storage::{KeyValueStore, ObjectInfo, ObjectStore, Record, RecordStore};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
