//! Periodic sync trigger.
//!
//! The scheduler never syncs by itself; on each tick it calls back into the
//! engine, which enqueues a full sync unless one is already waiting. With an
//! advisory lease the loop wakes more often than the sync interval to keep
//! the heartbeat fresher than the lease TTL, and only the lease holder ticks.

use bridge_traits::{Clock, PlatformSend};
use core_async::time::sleep;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::lease::AdvisoryLease;

pub struct SyncScheduler {
    interval: Duration,
    clock: Arc<dyn Clock>,
    lease: Option<(Arc<AdvisoryLease>, Duration)>,
    running: Mutex<Option<Arc<AtomicBool>>>,
}

impl SyncScheduler {
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval,
            clock,
            lease: None,
            running: Mutex::new(None),
        }
    }

    /// Gate ticks on `lease`, renewing it at least every `ttl / 2`.
    pub fn with_lease(mut self, lease: Arc<AdvisoryLease>, ttl: Duration) -> Self {
        self.lease = Some((lease, ttl));
        self
    }

    /// Start the timer loop. Returns `false` when it is already running.
    ///
    /// `on_tick` returns `false` to end the loop, e.g. once its owner is gone.
    pub fn start<F>(&self, on_tick: F) -> bool
    where
        F: Fn() -> bool + PlatformSend + 'static,
    {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running
            .as_ref()
            .is_some_and(|stopped| !stopped.load(Ordering::SeqCst))
        {
            return false;
        }

        let stopped = Arc::new(AtomicBool::new(false));
        *running = Some(Arc::clone(&stopped));

        let (step, steps_per_tick) = self.cadence();
        let clock = Arc::clone(&self.clock);
        let lease = self.lease.as_ref().map(|(lease, _)| Arc::clone(lease));
        info!(
            interval_secs = self.interval.as_secs(),
            leased = lease.is_some(),
            "Sync scheduler started"
        );

        core_async::spawn_detached(async move {
            let mut steps = 0u32;
            loop {
                sleep(step).await;
                if stopped.load(Ordering::SeqCst) {
                    break;
                }

                steps += 1;
                let now = clock.unix_timestamp_millis();
                if steps < steps_per_tick {
                    if let Some(lease) = &lease {
                        if let Err(err) = lease.renew(now) {
                            warn!("Lease heartbeat failed: {}", err);
                        }
                    }
                    continue;
                }
                steps = 0;

                if let Some(lease) = &lease {
                    match lease.try_acquire(now) {
                        Ok(true) => {}
                        Ok(false) => {
                            debug!("Skipping scheduled sync, another instance holds the lease");
                            continue;
                        }
                        Err(err) => {
                            warn!("Lease check failed, skipping scheduled sync: {}", err);
                            continue;
                        }
                    }
                }

                if !on_tick() {
                    debug!("Scheduler owner dropped");
                    stopped.store(true, Ordering::SeqCst);
                    break;
                }
            }
            info!("Sync scheduler stopped");
        });

        true
    }

    /// Stop the loop; it exits after its current sleep.
    pub fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stopped) = running {
            stopped.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|stopped| !stopped.load(Ordering::SeqCst))
    }

    /// Sleep step and how many steps make one sync interval.
    fn cadence(&self) -> (Duration, u32) {
        let Some((_, ttl)) = &self.lease else {
            return (self.interval, 1);
        };

        let heartbeat = (*ttl / 2).max(Duration::from_millis(1));
        if heartbeat >= self.interval {
            return (self.interval, 1);
        }

        let steps = self.interval.as_millis().div_ceil(heartbeat.as_millis());
        let steps = u32::try_from(steps).unwrap_or(u32::MAX).max(1);
        (self.interval / steps, steps)
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
