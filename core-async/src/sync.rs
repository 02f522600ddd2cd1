//! Synchronization primitives.
//!
//! - Native: `tokio::sync` (async-aware, `Send + Sync`)
//! - WASM: `futures::lock` and `futures::channel` (single-threaded)
//!
//! `broadcast` is Tokio's on both targets; its `sync` feature has no
//! runtime requirement and builds for `wasm32`.
//!
//! Both `Mutex` flavours expose `lock().await`, and both oneshot receivers
//! are futures resolving to `Result<T, _>`, so callers stay cfg-free as long
//! as they only map the receive error.

pub use tokio::sync::broadcast;

#[cfg(not(target_arch = "wasm32"))]
pub use tokio::sync::{oneshot, Mutex, MutexGuard};

#[cfg(target_arch = "wasm32")]
pub use futures::channel::oneshot;

#[cfg(target_arch = "wasm32")]
pub use futures::lock::{Mutex, MutexGuard};
