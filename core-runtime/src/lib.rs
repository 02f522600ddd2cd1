//! # Core Runtime Module
//!
//! Ambient infrastructure shared by every crate of the sync engine:
//! - Logging and tracing setup (`tracing-subscriber` natively, `tracing-wasm` in the browser)
//! - Engine configuration with fail-fast validation
//! - Event bus for hosts that prefer subscriptions over the status sink
//!
//! ## Overview
//!
//! Nothing here knows how synchronization works. `core-sync` consumes the
//! validated [`config::SyncEngineConfig`] and publishes
//! [`events::CoreEvent`]s; hosts call [`logging::init_logging`] once at startup.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
