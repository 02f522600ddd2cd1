//! Time-related abstractions.
//!
//! - Native: `tokio::time::sleep`
//! - WASM: `gloo-timers` (browser `setTimeout`)
//!
//! Wall-clock time is not provided here; the engine reads it through the
//! injectable `bridge_traits::time::Clock`.

pub use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
pub use tokio::time::sleep;

#[cfg(target_arch = "wasm32")]
/// Sleeps for the specified duration using the browser's `setTimeout`.
pub async fn sleep(duration: Duration) {
    gloo_timers::future::sleep(duration).await
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_advances_virtual_time() {
        let start = tokio::time::Instant::now();
        sleep(Duration::from_secs(300)).await;
        assert!(start.elapsed() >= Duration::from_secs(300));
    }
}
