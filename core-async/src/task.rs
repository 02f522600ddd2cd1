//! Task spawning abstractions.
//!
//! Only detached spawning is exposed: the sync engine never joins the tasks
//! it starts (queue drains, scheduler loops) and reports results through
//! channels instead, which keeps the native and browser APIs identical.
//!
//! ## Native (Tokio)
//! - Futures must be `Send + 'static`; they may run on any worker thread
//!
//! ## WASM
//! - Futures must be `'static` but not `Send`; they run on the page's event loop

use std::future::Future;

// ============================================================================
// Native Implementation (Tokio)
// ============================================================================

/// Boxed future that is `Send` where the platform requires it.
#[cfg(not(target_arch = "wasm32"))]
pub type BoxFuture<'a, T> = futures::future::BoxFuture<'a, T>;

#[cfg(not(target_arch = "wasm32"))]
/// Spawns a future on the current Tokio runtime without keeping a handle.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime, like `tokio::spawn`.
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(future);
}

// ============================================================================
// WASM Implementation
// ============================================================================

/// Boxed future; browser futures are never `Send`.
#[cfg(target_arch = "wasm32")]
pub type BoxFuture<'a, T> = futures::future::LocalBoxFuture<'a, T>;

#[cfg(target_arch = "wasm32")]
/// Spawns a future on the browser event loop.
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}
