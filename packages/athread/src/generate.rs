use std::marker::PhantomData;
use std::sync::Arc;

use crate::atomic::State;
use crate::bridge::{Advance, Bridge, Input, Shape, Worker};
use crate::channel::Envelope;
use crate::exec::{Executor, JoinPolicy};
use crate::{Config, ProtocolViolation};

/// A resumable computation that yields values and accepts sent values.
///
/// `resume(None)` starts the generator and runs it to its first yield.
/// After that, each `resume` continues from the last yield, with the value
/// sent by the consumer (if any). `Ok(None)` means the generator is finished.
pub trait Generator {
    /// Type of yielded values
    type Yield;
    /// Type of values sent into the generator
    type Input;

    fn resume(&mut self, sent: Option<Self::Input>) -> crate::Result<Option<Self::Yield>>;

    /// Continue the generator by raising `error` at the last yield.
    ///
    /// The default implementation doesn't handle the error and returns it,
    /// which finishes the generator.
    fn throw(&mut self, error: crate::Error) -> crate::Result<Option<Self::Yield>> {
        Err(error)
    }
}

/// A [`Generator`] from a closure that is called for each resume
pub struct FnGenerator<F, Y, S> {
    f: F,
    _marker: PhantomData<fn(S) -> Y>,
}

/// Create a [`Generator`] from a closure.
///
/// The closure is called with the sent value on each resume, and returns
/// the next yielded value, or `None` to finish.
pub fn generator_fn<Y, S, F>(f: F) -> FnGenerator<F, Y, S>
where
    F: FnMut(Option<S>) -> crate::Result<Option<Y>>,
{
    FnGenerator {
        f,
        _marker: PhantomData,
    }
}

impl<Y, S, F> Generator for FnGenerator<F, Y, S>
where
    F: FnMut(Option<S>) -> crate::Result<Option<Y>>,
{
    type Yield = Y;
    type Input = S;
    fn resume(&mut self, sent: Option<S>) -> crate::Result<Option<Y>> {
        (self.f)(sent)
    }
}

struct GenSource<G>(G);
impl<G: Generator> Advance for GenSource<G> {
    type Item = G::Yield;
    type Input = G::Input;
    fn advance(&mut self, input: Input<G::Input>) -> Envelope<G::Yield> {
        let result = match input {
            Input::Resume(sent) => self.0.resume(sent),
            Input::Throw(error) => self.0.throw(error),
        };
        match result {
            Ok(Some(value)) => Envelope::Value(value),
            Ok(None) => Envelope::End,
            Err(error) => Envelope::Error(error),
        }
    }
}

/// What [`Generate::throw`] does with the error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrowPolicy {
    /// Raise the error into the generator on the worker thread with
    /// [`Generator::throw`]. If the generator handles it and yields again,
    /// the yielded value is returned.
    Deliver,
    /// Don't involve the generator. The bridge is closed and the error is
    /// returned right away.
    Interrupt,
}

/// A blocking [`Generator`] driven by a worker thread, with values exchanged
/// asynchronously.
///
/// Each [`send`](Self::send) is one round trip: the value is sent to the worker,
/// the generator is resumed once, and the next yielded value is returned.
/// The first call must be `send(None)` (or [`next`](Self::next)) to start the
/// generator.
///
/// ```rust
/// # use pistonite_athread as athread;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> athread::Result<()> {
/// let mut total = 0;
/// let sum = athread::generator_fn(move |sent: Option<i32>| {
///     total += sent.unwrap_or_default();
///     Ok(Some(total))
/// });
/// let out = athread::generate(sum).scope(async |g| {
///     let mut out = vec![];
///     for v in [None, Some(1), Some(2), None] {
///         out.push(g.send(v).await.unwrap()?);
///     }
///     Ok(out)
/// }).await?;
/// assert_eq!(out, [0, 1, 3, 3]);
/// # Ok(()) }
/// ```
pub struct Generate<Y, S> {
    bridge: Bridge<Y, S>,
    primed: bool,
}

impl<Y: Send + 'static, S: Send + 'static> Generate<Y, S> {
    /// Create the bridge. `factory` is called on the worker thread to create
    /// the generator, so the generator itself doesn't need to be `Send`
    pub(crate) fn new<F, G>(executor: Arc<dyn Executor>, config: Config, factory: F) -> Self
    where
        F: FnOnce() -> G + Send + 'static,
        G: Generator<Yield = Y, Input = S>,
    {
        let bridge = Bridge::new(
            Shape::Exchange,
            executor,
            config,
            move |worker: Worker<Y, S>| worker.run(move |_| GenSource(factory())),
        );
        Self {
            bridge,
            primed: false,
        }
    }

    /// Start the worker
    pub fn open(&mut self) -> crate::Result<()> {
        self.bridge.open()
    }

    /// Resume the generator with `value`, and wait for the next yielded value.
    ///
    /// Returns `None` when the generator is finished. An error from the
    /// generator is returned once, and finishes the generator.
    ///
    /// Sending `Some` value before the generator is started with `send(None)`
    /// is a [`ProtocolViolation::NotPrimed`] error, and the worker is not involved.
    ///
    /// If an earlier call was cancelled while waiting, its yielded value
    /// is discarded before `value` is sent.
    pub async fn send(&mut self, value: Option<S>) -> Option<crate::Result<Y>> {
        if self.bridge.state() == State::Unopened {
            return Some(Err(ProtocolViolation::NotOpen.into()));
        }
        if let Some(end) = self.bridge.settle().await {
            return end.into_option();
        }
        if !self.primed && value.is_some() {
            return Some(Err(ProtocolViolation::NotPrimed.into()));
        }
        if self.bridge.is_finished() {
            return None;
        }
        self.primed = true;
        self.bridge.exchange(Input::Resume(value)).await.into_option()
    }

    /// Same as `send(None)`
    #[inline]
    pub async fn next(&mut self) -> Option<crate::Result<Y>> {
        self.send(None).await
    }

    /// Raise an error at the generator, see [`ThrowPolicy`].
    ///
    /// With [`ThrowPolicy::Interrupt`], the bridge is closed without waiting
    /// for the worker, and `error` is returned as-is.
    ///
    /// With [`ThrowPolicy::Deliver`], the generator's [`throw`](Generator::throw)
    /// is called on the worker thread, and its outcome is returned like [`send`](Self::send).
    /// If the generator is finished, `error` is returned as-is.
    pub async fn throw(&mut self, error: crate::Error, policy: ThrowPolicy) -> Option<crate::Result<Y>> {
        match policy {
            ThrowPolicy::Interrupt => {
                crate::debug!("interrupting generator: {error}");
                self.bridge.close_with(JoinPolicy::Detach).await;
                Some(Err(error))
            }
            ThrowPolicy::Deliver => {
                if self.bridge.state() == State::Unopened {
                    return Some(Err(ProtocolViolation::NotOpen.into()));
                }
                if !self.primed {
                    return Some(Err(ProtocolViolation::NotPrimed.into()));
                }
                match self.bridge.settle().await {
                    Some(Envelope::Error(stale)) => return Some(Err(stale)),
                    _ if self.bridge.is_finished() => return Some(Err(error)),
                    _ => {}
                }
                self.bridge.exchange(Input::Throw(error)).await.into_option()
            }
        }
    }

    /// Stop the worker and wait for it
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
}
