//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-service`, `core-sync`, `provider-google-drive`).
//! Host applications can depend on `cloudsync-workspace` and enable the
//! documented features without needing to wire each crate individually.

#[cfg(any(feature = "desktop-shims", feature = "wasm"))]
pub use core_service;

#[cfg(feature = "engine-only")]
pub use core_sync;

#[cfg(feature = "google-drive")]
pub use provider_google_drive;
