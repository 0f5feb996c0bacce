use std::time::{Duration, Instant};

use pistonite_athread as athread;
use athread::ProtocolViolation;

#[derive(Debug, PartialEq, derive_more::Display, derive_more::Error)]
#[display("disk on fire")]
struct DiskOnFire;

#[tokio::test]
async fn test_single_callback_returns_value() {
    let value = athread::single_callback(|emitter| {
        std::thread::sleep(Duration::from_millis(50));
        emitter.emit(1);
        Ok(())
    })
    .await
    .unwrap();
    assert_eq!(value, 1);
}

#[tokio::test]
async fn test_extra_emits_are_discarded() {
    let value = athread::single_callback(|emitter| {
        emitter.emit("first");
        emitter.emit("second");
        Ok(())
    })
    .await
    .unwrap();
    assert_eq!(value, "first");
}

#[tokio::test]
async fn test_no_emit_is_protocol_violation() {
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        athread::single_callback(|_: &athread::Emitter<u32>| Ok(())),
    )
    .await
    .expect("single result hung");
    let err = result.unwrap_err();
    assert_eq!(
        err.downcast_ref::<ProtocolViolation>(),
        Some(&ProtocolViolation::NoValue)
    );
}

#[tokio::test]
async fn test_call() {
    let value = athread::call(|| {
        std::thread::sleep(Duration::from_millis(20));
        Ok(vec![1, 2, 3])
    })
    .await
    .unwrap();
    assert_eq!(value, [1, 2, 3]);
}

#[tokio::test]
async fn test_call_error_keeps_type() {
    let err = athread::call(|| -> athread::Result<()> { Err(DiskOnFire.into()) })
        .await
        .unwrap_err();
    assert_eq!(err.downcast_ref::<DiskOnFire>(), Some(&DiskOnFire));
}

#[tokio::test]
async fn test_cancel_is_prompt() {
    let task = tokio::spawn(athread::call(|| {
        std::thread::sleep(Duration::from_secs(1));
        Ok(1)
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;
    let start = Instant::now();
    task.abort();
    let err = task.await.unwrap_err();
    assert!(err.is_cancelled());
    // not waiting for the sleep to finish
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_timeout_is_prompt() {
    let start = Instant::now();
    let result = tokio::time::timeout(
        Duration::from_millis(50),
        athread::call(|| {
            std::thread::sleep(Duration::from_secs(1));
            Ok(1)
        }),
    )
    .await;
    assert!(result.is_err());
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_builder_call_on_threads() {
    let builder = athread::Builder::default().executor(athread::exec::Threads::new("caller"));
    let name = builder
        .call(|| Ok(std::thread::current().name().map(|x| x.to_string())))
        .await
        .unwrap()
        .unwrap_or_default();
    assert!(name.starts_with("caller-"), "{name}");
}
