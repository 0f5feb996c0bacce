use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use pistonite_athread as athread;

static TEST_VALUES: [&str; 6] = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"];

/// A blocking API that reports results through a callback
fn scan(delay: Duration, mut on_found: impl FnMut(&'static str)) {
    for value in TEST_VALUES {
        std::thread::sleep(delay);
        on_found(value);
    }
}

#[tokio::test]
async fn test_emits_in_order() {
    let out = athread::iterate_callback(|emitter| {
        scan(Duration::ZERO, |x| {
            emitter.emit(x);
        });
        Ok(())
    })
    .collect()
    .await
    .unwrap();
    assert_eq!(out, TEST_VALUES);
}

#[tokio::test]
async fn test_no_emit_is_empty() {
    let out = athread::iterate_callback(|_: &athread::Emitter<u32>| Ok(()))
        .collect()
        .await
        .unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_error_after_values() {
    let mut it = athread::iterate_callback(|emitter| {
        for i in 1..=3 {
            emitter.emit(i);
        }
        athread::bail!("scanner crashed");
    });
    it.open().unwrap();
    for i in 1..=3 {
        assert_eq!(it.next().await.unwrap().unwrap(), i);
    }
    let err = it.next().await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "scanner crashed");
    assert!(it.next().await.is_none());
    it.close().await;
}

#[tokio::test]
async fn test_panic_is_delivered() {
    let mut it = athread::iterate_callback(|emitter| {
        emitter.emit(1);
        panic!("scanner exploded");
    });
    it.open().unwrap();
    assert_eq!(it.next().await.unwrap().unwrap(), 1);
    let err = it.next().await.unwrap().unwrap_err();
    let panic = err.downcast_ref::<athread::WorkerPanic>().unwrap();
    assert_eq!(panic.info, "scanner exploded");
    assert!(it.next().await.is_none());
    it.close().await;
}

#[tokio::test]
async fn test_close_does_not_wait_and_stops_delivery() {
    let stopped = Arc::new(AtomicBool::new(false));
    let s = Arc::clone(&stopped);
    let mut it = athread::iterate_callback(move |emitter| {
        for i in 0.. {
            std::thread::sleep(Duration::from_millis(200));
            if !emitter.emit(i) {
                assert!(emitter.is_closed());
                s.store(true, Ordering::SeqCst);
                break;
            }
        }
        Ok(())
    });
    it.open().unwrap();
    assert_eq!(it.next().await.unwrap().unwrap(), 0);
    let start = Instant::now();
    it.close().await;
    // the function is in the middle of a 200ms sleep
    assert!(start.elapsed() < Duration::from_millis(100));
    assert!(it.next().await.is_none());
    // the function sees the close at its next emit
    let start = Instant::now();
    while !stopped.load(Ordering::SeqCst) {
        assert!(start.elapsed() < Duration::from_secs(5), "runner never stopped");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_parallel_callbacks() {
    let delay = Duration::from_millis(40);
    let run = move || {
        athread::iterate_callback(move |emitter| {
            scan(delay, |x| {
                emitter.emit(x);
            });
            Ok(())
        })
        .collect()
    };
    let start = Instant::now();
    let (a, b, c) = tokio::join!(run(), run(), run());
    let elapsed = start.elapsed();
    assert_eq!(a.unwrap(), TEST_VALUES);
    assert_eq!(b.unwrap(), TEST_VALUES);
    assert_eq!(c.unwrap(), TEST_VALUES);
    // 240ms each, 720ms one after the other
    assert!(elapsed < Duration::from_millis(600), "took {elapsed:?}");
}
