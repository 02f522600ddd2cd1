//! # Google Drive Provider
//!
//! Implements the `ObjectStore` bridge over the Google Drive API v3
//! `appDataFolder`, a hidden per-application folder that is a natural home
//! for the sync manifest, item payloads and backups.
//!
//! ## Overview
//!
//! - Requests go through the host's `HttpClient` (reqwest natively, `fetch`
//!   in the browser)
//! - Bearer tokens come from an [`AccessTokenProvider`] owned by the host
//! - Object keys map one-to-one onto Drive file names

pub mod connector;
pub mod error;
pub mod token;
pub mod types;

pub use connector::GoogleDriveObjectStore;
pub use error::{GoogleDriveError, Result};
pub use token::{AccessTokenProvider, StaticTokenProvider};
