//! # Operation Queue
//!
//! Serializes sync and backup operations so at most one runs at a time.
//!
//! ## State Machine
//!
//! ```text
//! Idle ──enqueue──> Draining ──list empty──> Idle
//!                     │  ▲
//!                     └──┘ next operation (FIFO)
//! ```
//!
//! `enqueue` appends to the pending list and, when the queue is idle, spawns
//! a detached drain task. The drain task pops operations one by one until the
//! list is empty, so operations enqueued mid-drain run in the same pass.
//! The pending list and the draining flag share one lock: an enqueue that
//! races the end of a drain either lands before the final check or starts a
//! fresh drain.
//!
//! A failing or panicking operation is reported through its handle and the
//! observer; later operations still run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let queue: OperationQueue<u32> = OperationQueue::new();
//! let handle = queue.enqueue("sync", Box::pin(async { Ok(1) }));
//! assert_eq!(handle.wait().await?, 1);
//! ```

use bridge_traits::{Clock, PlatformSend, PlatformSendSync, SystemClock};
use core_async::sync::oneshot;
use core_async::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

use crate::error::{Result, SyncError};

/// Receives queue lifecycle callbacks.
///
/// Callbacks run on the drain task and must return quickly. `on_idle` runs
/// while the queue lock is held, so it must not enqueue.
pub trait QueueObserver<T>: PlatformSendSync {
    fn on_start(&self, _name: &str) {}
    fn on_finish(&self, _name: &str, _result: &Result<T>) {}
    fn on_idle(&self) {}
}

struct NoopObserver;

impl<T> QueueObserver<T> for NoopObserver {}

struct Operation<T> {
    name: String,
    action: BoxFuture<'static, Result<T>>,
    enqueued_at: i64,
    responder: oneshot::Sender<Result<T>>,
}

struct QueueState<T> {
    pending: VecDeque<Operation<T>>,
    draining: bool,
    current: Option<String>,
}

struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    observer: Arc<dyn QueueObserver<T>>,
    clock: Arc<dyn Clock>,
}

impl<T> QueueInner<T> {
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a queued operation's result.
///
/// Dropping the handle does not cancel the operation.
pub struct OperationHandle<T> {
    name: String,
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> OperationHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the operation to finish.
    pub async fn wait(self) -> Result<T> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(SyncError::OperationAbandoned { name: self.name }),
        }
    }
}

/// FIFO queue executing one operation at a time.
pub struct OperationQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for OperationQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: PlatformSend + 'static> Default for OperationQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PlatformSend + 'static> OperationQueue<T> {
    pub fn new() -> Self {
        Self::with_observer(Arc::new(NoopObserver))
    }

    pub fn with_observer(observer: Arc<dyn QueueObserver<T>>) -> Self {
        Self::with_observer_and_clock(observer, Arc::new(SystemClock))
    }

    /// Queue whose wait-time bookkeeping reads `clock`.
    pub fn with_observer_and_clock(
        observer: Arc<dyn QueueObserver<T>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    draining: false,
                    current: None,
                }),
                observer,
                clock,
            }),
        }
    }

    /// Append an operation and start draining if idle.
    pub fn enqueue(
        &self,
        name: impl Into<String>,
        action: BoxFuture<'static, Result<T>>,
    ) -> OperationHandle<T> {
        let name = name.into();
        let (responder, receiver) = oneshot::channel();

        let start_drain = {
            let mut state = self.inner.lock();
            state.pending.push_back(Operation {
                name: name.clone(),
                action,
                enqueued_at: self.inner.clock.unix_timestamp_millis(),
                responder,
            });
            debug!(operation = %name, pending = state.pending.len(), "Operation enqueued");

            let idle = !state.draining;
            state.draining = true;
            idle
        };

        if start_drain {
            core_async::spawn_detached(drain(Arc::clone(&self.inner)));
        }

        OperationHandle { name, receiver }
    }

    /// Names of operations waiting to run, oldest first.
    pub fn pending_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .pending
            .iter()
            .map(|op| op.name.clone())
            .collect()
    }

    /// Name of the operation currently executing.
    pub fn current(&self) -> Option<String> {
        self.inner.lock().current.clone()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.lock().draining
    }

    /// True when `name` is running or waiting.
    pub fn contains(&self, name: &str) -> bool {
        let state = self.inner.lock();
        state.current.as_deref() == Some(name) || state.pending.iter().any(|op| op.name == name)
    }
}

async fn drain<T: PlatformSend + 'static>(inner: Arc<QueueInner<T>>) {
    loop {
        let next = {
            let mut state = inner.lock();
            match state.pending.pop_front() {
                Some(op) => {
                    state.current = Some(op.name.clone());
                    Some(op)
                }
                None => {
                    state.draining = false;
                    state.current = None;
                    inner.observer.on_idle();
                    None
                }
            }
        };

        let Some(op) = next else {
            debug!("Operation queue drained");
            return;
        };

        let Operation {
            name,
            action,
            enqueued_at,
            responder,
        } = op;

        let waited_ms = inner
            .clock
            .unix_timestamp_millis()
            .saturating_sub(enqueued_at);
        debug!(operation = %name, waited_ms, "Operation started");
        inner.observer.on_start(&name);

        let result = match AssertUnwindSafe(action).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic);
                error!(operation = %name, "Operation panicked: {}", message);
                Err(SyncError::OperationPanicked {
                    name: name.clone(),
                    message,
                })
            }
        };

        if let Err(err) = &result {
            warn!(operation = %name, "Operation failed: {}", err);
        }
        inner.observer.on_finish(&name, &result);

        if responder.send(result).is_err() {
            debug!(operation = %name, "Result dropped, nobody is waiting");
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::time::{sleep, Duration};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl QueueObserver<u32> for RecordingObserver {
        fn on_start(&self, name: &str) {
            self.events.lock().unwrap().push(format!("start:{}", name));
        }

        fn on_finish(&self, name: &str, result: &Result<u32>) {
            let tag = if result.is_ok() { "ok" } else { "err" };
            self.events.lock().unwrap().push(format!("{}:{}", tag, name));
        }

        fn on_idle(&self) {
            self.events.lock().unwrap().push("idle".to_string());
        }
    }

    #[tokio::test]
    async fn test_operations_run_in_fifo_order_even_when_first_is_slow() {
        let queue: OperationQueue<u32> = OperationQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = [("a", 50u64), ("b", 0), ("c", 0)]
            .into_iter()
            .map(|(name, delay)| {
                let order = Arc::clone(&order);
                queue.enqueue(
                    name,
                    Box::pin(async move {
                        sleep(Duration::from_millis(delay)).await;
                        order.lock().unwrap().push(name);
                        Ok(0)
                    }),
                )
            })
            .collect();

        for handle in handles {
            handle.wait().await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_operations_never_overlap() {
        let queue: OperationQueue<u32> = OperationQueue::new();
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let running = Arc::clone(&running);
                let max_seen = Arc::clone(&max_seen);
                queue.enqueue(
                    format!("op-{}", i),
                    Box::pin(async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(i)
                    }),
                )
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.wait().await.unwrap(), i as u32);
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_and_panic_do_not_stop_the_queue() {
        let observer = Arc::new(RecordingObserver::default());
        let queue: OperationQueue<u32> = OperationQueue::with_observer(observer.clone());

        let failing = queue.enqueue(
            "failing",
            Box::pin(async { Err(SyncError::OperationFailed("boom".to_string())) }),
        );
        let panicking = queue.enqueue(
            "panicking",
            Box::pin(async {
                if true {
                    panic!("kaboom");
                }
                Ok(0)
            }),
        );
        let healthy = queue.enqueue("healthy", Box::pin(async { Ok(7) }));

        assert!(matches!(
            failing.wait().await,
            Err(SyncError::OperationFailed(_))
        ));
        match panicking.wait().await {
            Err(SyncError::OperationPanicked { name, message }) => {
                assert_eq!(name, "panicking");
                assert_eq!(message, "kaboom");
            }
            other => panic!("expected panic error, got {:?}", other),
        }
        assert_eq!(healthy.wait().await.unwrap(), 7);

        // Idle is signalled after the last handle resolves.
        for _ in 0..50 {
            if !queue.is_draining() {
                break;
            }
            sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec![
                "start:failing",
                "err:failing",
                "start:panicking",
                "err:panicking",
                "start:healthy",
                "ok:healthy",
                "idle",
            ]
        );
    }

    #[tokio::test]
    async fn test_enqueue_during_drain_runs_in_same_pass() {
        let observer = Arc::new(RecordingObserver::default());
        let queue: OperationQueue<u32> = OperationQueue::with_observer(observer.clone());

        let inner_queue = queue.clone();
        let outer = queue.enqueue(
            "outer",
            Box::pin(async move {
                let handle = inner_queue.enqueue("inner", Box::pin(async { Ok(2) }));
                assert!(inner_queue.contains("inner"));
                drop(handle);
                Ok(1)
            }),
        );
        assert_eq!(outer.wait().await.unwrap(), 1);

        for _ in 0..50 {
            if !queue.is_draining() {
                break;
            }
            sleep(Duration::from_millis(1)).await;
        }
        let events = observer.events.lock().unwrap().clone();
        assert_eq!(events.iter().filter(|e| *e == "idle").count(), 1);
        assert_eq!(events.last().map(String::as_str), Some("idle"));
        assert!(events.contains(&"ok:inner".to_string()));
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            use chrono::TimeZone;
            chrono::Utc.timestamp_millis_opt(42).unwrap()
        }
    }

    #[tokio::test]
    async fn test_queue_runs_with_injected_clock() {
        let observer = Arc::new(RecordingObserver::default());
        let queue: OperationQueue<u32> =
            OperationQueue::with_observer_and_clock(observer.clone(), Arc::new(FixedClock));

        assert_eq!(queue.inner.clock.unix_timestamp_millis(), 42);
        let handle = queue.enqueue("sync", Box::pin(async { Ok(3) }));
        assert_eq!(handle.wait().await.unwrap(), 3);
        assert!(observer
            .events
            .lock()
            .unwrap()
            .contains(&"ok:sync".to_string()));
    }

    #[tokio::test]
    async fn test_pending_names_and_state() {
        let queue: OperationQueue<u32> = OperationQueue::new();
        assert!(!queue.is_draining());

        let gate = Arc::new(tokio::sync::Notify::new());
        let blocker = {
            let gate = Arc::clone(&gate);
            queue.enqueue(
                "sync",
                Box::pin(async move {
                    gate.notified().await;
                    Ok(0)
                }),
            )
        };
        let backup = queue.enqueue("backup", Box::pin(async { Ok(1) }));

        // Let the drain task pick up the first operation.
        for _ in 0..50 {
            if queue.current().is_some() {
                break;
            }
            sleep(Duration::from_millis(1)).await;
        }
        assert!(queue.is_draining());
        assert_eq!(queue.current().as_deref(), Some("sync"));
        assert_eq!(queue.pending_names(), vec!["backup".to_string()]);

        gate.notify_one();
        blocker.wait().await.unwrap();
        backup.wait().await.unwrap();
    }
}
