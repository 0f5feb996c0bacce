use std::sync::Arc;

use crate::atomic::State;
use crate::bridge::{Advance, Bridge, Input, Shape, Worker};
use crate::channel::Envelope;
use crate::exec::Executor;
use crate::Config;

/// A blocking iterator driven by a worker thread, consumed asynchronously.
///
/// Created with [`athread::iterate`](crate::iterate) and friends, or with a
/// [`Builder`](crate::Builder). The worker is not started until the bridge is
/// opened with [`open`](Self::open) or [`scope`](Self::scope).
///
/// By default, each [`next`](Self::next) advances the iterator exactly once
/// on the worker thread. See [`Config::max_buffered`] to let the worker
/// run ahead.
///
/// ```rust
/// # use pistonite_athread as athread;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> athread::Result<()> {
/// let lines = athread::iterate(["a", "b", "c"]).scope(async |it| {
///     let mut out = vec![];
///     while let Some(line) = it.next().await {
///         out.push(line?);
///     }
///     Ok(out)
/// }).await?;
/// assert_eq!(lines, ["a", "b", "c"]);
/// # Ok(()) }
/// ```
pub struct Iterate<T> {
    bridge: Bridge<T, ()>,
}

struct IterSource<It>(It);
impl<It, T, E> Advance for IterSource<It>
where
    It: Iterator<Item = Result<T, E>>,
    E: Into<crate::Error>,
{
    type Item = T;
    type Input = ();
    fn advance(&mut self, input: Input<()>) -> Envelope<T> {
        if let Input::Throw(error) = input {
            return Envelope::Error(error);
        }
        match self.0.next() {
            Some(Ok(value)) => Envelope::Value(value),
            Some(Err(error)) => Envelope::Error(error.into()),
            None => Envelope::End,
        }
    }
}

impl<T: Send + 'static> Iterate<T> {
    /// Create the bridge. `factory` is called on the worker thread to create
    /// the iterator, so the iterator itself doesn't need to be `Send`
    pub(crate) fn new<F, It, E>(executor: Arc<dyn Executor>, config: Config, factory: F) -> Self
    where
        F: FnOnce() -> It + Send + 'static,
        It: IntoIterator<Item = Result<T, E>>,
        E: Into<crate::Error>,
    {
        let bridge = Bridge::new(
            Shape::Pull,
            executor,
            config,
            move |worker: Worker<T, ()>| worker.run(move |_| IterSource(factory().into_iter())),
        );
        Self { bridge }
    }

    /// Start the worker
    pub fn open(&mut self) -> crate::Result<()> {
        self.bridge.open()
    }

    /// Get the next item, waiting for the worker without blocking the async runtime.
    ///
    /// Returns `None` when the iterator is exhausted. If the iterator produced
    /// an error, it's returned once, and `None` is returned after that.
    ///
    /// Cancelling this future doesn't lose an item: the step it started
    /// is returned by the next call.
    pub async fn next(&mut self) -> Option<crate::Result<T>> {
        self.bridge.next_item().await.into_option()
    }

    /// Stop the worker and wait for it.
    ///
    /// If the worker is blocked inside the iterator's `next`, this waits
    /// for that call to return, unless a different [`JoinPolicy`](crate::exec::JoinPolicy)
    /// is configured.
    pub async fn close(&mut self) {
        self.bridge.close().await
    }

    /// Current lifecycle state
    pub fn state(&self) -> State {
        self.bridge.state()
    }

    /// Open the bridge, run `f` with it, then close the bridge,
    /// even if `f` returns an error.
    pub async fn scope<R>(mut self, f: impl AsyncFnOnce(&mut Self) -> crate::Result<R>) -> crate::Result<R> {
        self.open()?;
        let result = f(&mut self).await;
        self.close().await;
        result
    }

    /// Open the bridge and collect all items.
    ///
    /// Stops at the first error and returns it.
    pub async fn collect(mut self) -> crate::Result<Vec<T>> {
        self.open()?;
        let mut out = vec![];
        let result = loop {
            match self.next().await {
                Some(Ok(item)) => out.push(item),
                Some(Err(e)) => break Err(e),
                None => break Ok(out),
            }
        };
        self.close().await;
        result
    }
}
