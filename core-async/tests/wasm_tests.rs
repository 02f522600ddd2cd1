//! Integration tests for core-async on WASM platforms.

#![cfg(target_arch = "wasm32")]

use core_async::{sync, task, time, BoxFuture};
use std::rc::Rc;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
async fn test_detached_task_reports_through_oneshot() {
    let (tx, rx) = sync::oneshot::channel();
    task::spawn_detached(async move {
        time::sleep(time::Duration::from_millis(5)).await;
        let _ = tx.send(42);
    });

    assert_eq!(rx.await.unwrap(), 42);
}

#[wasm_bindgen_test]
async fn test_local_boxed_futures() {
    let log = Rc::new(sync::Mutex::new(Vec::new()));
    let jobs: Vec<BoxFuture<'static, ()>> = (0..3)
        .map(|i| {
            let log = Rc::clone(&log);
            Box::pin(async move { log.lock().await.push(i) }) as BoxFuture<'static, ()>
        })
        .collect();

    for job in jobs {
        job.await;
    }
    assert_eq!(*log.lock().await, vec![0, 1, 2]);
}

#[wasm_bindgen_test]
async fn test_sleep_waits_on_set_timeout() {
    let start = js_sys::Date::now();
    time::sleep(time::Duration::from_millis(20)).await;
    assert!(js_sys::Date::now() - start >= 15.0);
}

#[wasm_bindgen_test]
async fn test_broadcast_across_spawned_task() {
    let (tx, mut rx) = sync::broadcast::channel(4);
    task::spawn_detached(async move {
        let _ = tx.send("synced");
    });

    assert_eq!(rx.recv().await.unwrap(), "synced");
}

#[wasm_bindgen_test]
async fn test_dropped_oneshot_sender() {
    let (tx, rx) = sync::oneshot::channel::<u8>();
    drop(tx);
    assert!(rx.await.is_err());
}
