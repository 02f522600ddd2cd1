//! Runtime-agnostic async abstraction layer.
//!
//! The sync engine runs natively on Tokio and inside a browser tab on the
//! JavaScript event loop. Crates in this workspace depend on `core-async`
//! instead of Tokio so the same code compiles for both:
//! - Native: `tokio::spawn`, `tokio::time`, `tokio::sync`
//! - WASM: `wasm_bindgen_futures::spawn_local`, `gloo-timers`, `futures::lock`
//!
//! # Modules
//!
//! - `task`: Detached task spawning
//! - `time`: Sleeping
//! - `sync`: Async mutex and oneshot channels
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! fn example() {
//!     task::spawn_detached(async {
//!         sleep(Duration::from_millis(10)).await;
//!     });
//! }
//! ```

pub mod sync;
pub mod task;
pub mod time;

pub use task::{spawn_detached, BoxFuture};
pub use time::{sleep, Duration};
