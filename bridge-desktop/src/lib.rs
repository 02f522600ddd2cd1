//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides implementations of the bridge traits using
//! desktop-appropriate libraries:
//! - `HttpClient` using `reqwest`
//! - `ObjectStore` over a local directory using `tokio::fs`
//! - `RecordStore` using SQLite via `sqlx`
//! - `KeyValueStore` as a JSON file (the desktop `localStorage`)
//! - `StatusSink` that logs through `tracing`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FsObjectStore, JsonFileKeyValueStore, SqliteRecordStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let remote = FsObjectStore::new("/mnt/nas/cloudsync");
//!     let settings = JsonFileKeyValueStore::open("settings.json")?;
//!     let records = SqliteRecordStore::new("records.sqlite".into()).await?;
//!
//!     // Hand these to core_runtime::config::SyncEngineConfig::builder()
//!     Ok(())
//! }
//! ```

mod database;
mod filesystem;
mod http;
mod settings;
mod status;

pub use database::SqliteRecordStore;
pub use filesystem::FsObjectStore;
pub use http::ReqwestHttpClient;
pub use settings::JsonFileKeyValueStore;
pub use status::TracingStatusSink;
