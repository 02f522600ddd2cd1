//! Advisory cross-tab lease.
//!
//! Several tabs of the same app share one key-value storage. The lease is a
//! heartbeat record under `cloudsync::lease` telling the others which tab
//! runs scheduled syncs. It is advisory: nothing stops a tab without the
//! lease from syncing when the user asks.

use bridge_traits::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

pub const LEASE_KEY: &str = "cloudsync::lease";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    pub holder_id: String,
    /// Unix millis of the holder's last heartbeat
    pub heartbeat_at: i64,
}

pub struct AdvisoryLease {
    store: Arc<dyn KeyValueStore>,
    holder_id: String,
    ttl_ms: i64,
}

impl AdvisoryLease {
    /// New lease handle with a random holder id.
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self::with_holder_id(store, ttl, Uuid::new_v4().to_string())
    }

    pub fn with_holder_id(
        store: Arc<dyn KeyValueStore>,
        ttl: Duration,
        holder_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            holder_id: holder_id.into(),
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Current lease record, if any readable one exists.
    pub fn holder(&self) -> Result<Option<LeaseRecord>> {
        let Some(raw) = self.store.get(LEASE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!("Ignoring unreadable lease record: {}", err);
                Ok(None)
            }
        }
    }

    /// Take the lease when it is free, stale, unreadable or already ours.
    pub fn try_acquire(&self, now: i64) -> Result<bool> {
        if let Some(current) = self.holder()? {
            let ours = current.holder_id == self.holder_id;
            let stale = self.is_stale(&current, now);
            if !ours && !stale {
                debug!(holder = %current.holder_id, "Lease held by another instance");
                return Ok(false);
            }
            if !ours {
                debug!(previous = %current.holder_id, "Taking over stale lease");
            }
        }

        self.write(now)?;
        Ok(true)
    }

    /// Refresh the heartbeat if this instance holds the lease.
    pub fn renew(&self, now: i64) -> Result<bool> {
        match self.holder()? {
            Some(current) if current.holder_id == self.holder_id => {
                self.write(now)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Give the lease up if this instance holds it.
    pub fn release(&self) -> Result<()> {
        if let Some(current) = self.holder()? {
            if current.holder_id == self.holder_id {
                self.store.remove(LEASE_KEY)?;
            }
        }
        Ok(())
    }

    /// A heartbeat older than the TTL, or further than the TTL in the future,
    /// no longer protects the lease.
    fn is_stale(&self, record: &LeaseRecord, now: i64) -> bool {
        let age = now.saturating_sub(record.heartbeat_at);
        age > self.ttl_ms || age < self.ttl_ms.saturating_neg()
    }

    fn write(&self, now: i64) -> Result<()> {
        let record = LeaseRecord {
            holder_id: self.holder_id.clone(),
            heartbeat_at: now,
        };
        self.store.set(LEASE_KEY, &serde_json::to_string(&record)?)?;
        Ok(())
    }
}
