//! Access token sources
//!
//! The OAuth flow itself belongs to the host (`chrome.identity`, a desktop
//! login window). The store only asks for a current bearer token before
//! each request.

use bridge_traits::error::Result;
use bridge_traits::platform::PlatformSendSync;
use std::sync::{Mutex, PoisonError};

/// Supplies a bearer token with the `drive.appdata` scope
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait AccessTokenProvider: PlatformSendSync {
    async fn access_token(&self) -> Result<String>;
}

/// A token set by the host and replaced whenever it refreshes
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    token: Mutex<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(token.into()),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = token.into();
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
