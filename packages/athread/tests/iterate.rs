use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use pistonite_athread as athread;

#[derive(Debug, PartialEq, derive_more::Display, derive_more::Error)]
#[display("item {index} is broken")]
struct Broken {
    #[error(not(source))]
    index: u32,
}

#[tokio::test]
async fn test_collect_preserves_order() {
    let source: Vec<String> = (0..200).map(|i| format!("line {i}")).collect();
    let out = athread::iterate(source.clone()).collect().await.unwrap();
    assert_eq!(out, source);

    let out = athread::iterate(Vec::<u8>::new()).collect().await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_parallel_bridges() {
    let delay = Duration::from_millis(50);
    let slow = move |tag: u32| {
        athread::iterate_with(move || {
            (0..5).map(move |i| {
                std::thread::sleep(delay);
                (tag, i)
            })
        })
        .collect()
    };
    let start = Instant::now();
    let (a, b, c, d) = tokio::join!(slow(0), slow(1), slow(2), slow(3));
    let elapsed = start.elapsed();
    for (tag, out) in [a, b, c, d].into_iter().enumerate() {
        let expected: Vec<_> = (0..5).map(|i| (tag as u32, i)).collect();
        assert_eq!(out.unwrap(), expected);
    }
    // 5 items in each bridge is 250ms, running them one after the other would be 1s
    assert!(elapsed < Duration::from_millis(700), "took {elapsed:?}");
}

#[tokio::test]
async fn test_early_break_on_infinite_source() {
    let run = async {
        athread::iterate(0u64..)
            .scope(async |it| {
                let mut out = vec![];
                if let Some(x) = it.next().await {
                    out.push(x?);
                }
                Ok(out)
            })
            .await
    };
    let out = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("closing hung")
        .unwrap();
    assert_eq!(out, [0]);
}

#[tokio::test]
async fn test_early_break_free_running() {
    let produced = Arc::new(AtomicUsize::new(0));
    let p = Arc::clone(&produced);
    let mut it = athread::Builder::default()
        .max_buffered(None)
        .iterate((0u64..).inspect(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        }));
    it.open().unwrap();
    assert_eq!(it.next().await.unwrap().unwrap(), 0);
    tokio::time::timeout(Duration::from_secs(5), it.close())
        .await
        .expect("closing hung");
    assert_eq!(it.state(), athread::State::Closed);
    assert!(it.next().await.is_none());
    // the worker stopped after close
    let count = produced.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(produced.load(Ordering::SeqCst), count);
}

#[tokio::test]
async fn test_error_is_delivered_once() {
    let source = (1..=5).map(|i| if i == 3 { Err(Broken { index: i }) } else { Ok(i) });
    let mut it = athread::try_iterate(source);
    it.open().unwrap();
    assert_eq!(it.next().await.unwrap().unwrap(), 1);
    assert_eq!(it.next().await.unwrap().unwrap(), 2);
    let err = it.next().await.unwrap().unwrap_err();
    assert_eq!(err.downcast_ref::<Broken>(), Some(&Broken { index: 3 }));
    assert!(it.next().await.is_none());
    assert!(it.next().await.is_none());
    it.close().await;
}

#[tokio::test]
async fn test_collect_stops_at_error() {
    let source = vec![Ok(1), Err(athread::fmterr!("bad")), Ok(3)];
    let err = athread::try_iterate(source).collect().await.unwrap_err();
    assert_eq!(err.to_string(), "bad");
}

#[tokio::test]
async fn test_non_send_iterator_is_created_on_worker() {
    let out = athread::iterate_with(|| {
        let data = Rc::new(vec![10, 20, 30]);
        (0..3).map(move |i| data[i])
    })
    .collect()
    .await
    .unwrap();
    assert_eq!(out, [10, 20, 30]);
}

#[tokio::test]
async fn test_next_before_open() {
    let mut it = athread::iterate([1, 2, 3]);
    assert_eq!(it.state(), athread::State::Unopened);
    let err = it.next().await.unwrap().unwrap_err();
    assert_eq!(
        err.downcast_ref::<athread::ProtocolViolation>(),
        Some(&athread::ProtocolViolation::NotOpen)
    );
    it.open().unwrap();
    assert_eq!(it.next().await.unwrap().unwrap(), 1);
    it.close().await;
}

#[tokio::test]
async fn test_lockstep_and_bounded_buffer() {
    for (max_buffered, ahead) in [(Some(0), 0), (Some(2), 2)] {
        let produced = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&produced);
        let mut it = athread::Builder::default()
            .max_buffered(max_buffered)
            .iterate((0..10).inspect(move |_| {
                p.fetch_add(1, Ordering::SeqCst);
            }));
        it.open().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(produced.load(Ordering::SeqCst), ahead);
        assert_eq!(it.next().await.unwrap().unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(produced.load(Ordering::SeqCst), ahead + 1);
        it.close().await;
    }
}

#[tokio::test]
async fn test_cancelled_next_does_not_skip_or_run_ahead() {
    let produced = Arc::new(AtomicUsize::new(0));
    let p = Arc::clone(&produced);
    let mut it = athread::iterate_with(move || {
        (0..).map(move |i| {
            p.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(100));
            i
        })
    });
    it.open().unwrap();
    let pending = tokio::time::timeout(Duration::from_millis(20), it.next()).await;
    assert!(pending.is_err());
    // the step started by the cancelled call
    assert_eq!(it.next().await.unwrap().unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(produced.load(Ordering::SeqCst), 1);
    assert_eq!(it.next().await.unwrap().unwrap(), 1);
    assert_eq!(produced.load(Ordering::SeqCst), 2);
    it.close().await;
}

#[tokio::test]
async fn test_close_timeout_abandons_blocked_worker() {
    let before = athread::abandoned_workers();
    let mut it = athread::Builder::default()
        .join(athread::exec::JoinPolicy::Timeout(Duration::from_millis(50)))
        .iterate_with(|| {
            (0..).map(|i| {
                std::thread::sleep(Duration::from_secs(2));
                i
            })
        });
    it.open().unwrap();
    // start a step, then give up on it
    let pending = tokio::time::timeout(Duration::from_millis(20), it.next()).await;
    assert!(pending.is_err());
    let start = Instant::now();
    it.close().await;
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(it.state(), athread::State::Closed);
    assert!(athread::abandoned_workers() > before);
}

#[tokio::test]
async fn test_on_dedicated_runtime() {
    let executor = athread::exec::runtime(2).unwrap();
    let builder = athread::Builder::default().executor(executor);
    let (a, b) = tokio::join!(
        builder.iterate(0..50).collect(),
        builder.iterate(50..100).collect()
    );
    assert_eq!(a.unwrap(), (0..50).collect::<Vec<_>>());
    assert_eq!(b.unwrap(), (50..100).collect::<Vec<_>>());
}
