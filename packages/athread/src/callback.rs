use std::sync::Arc;

use crate::atomic::State;
use crate::bridge::{Advance, Bridge, Input, Shape, Shared, Worker};
use crate::channel::Envelope;
use crate::exec::Executor;
use crate::{Config, ProtocolViolation};

/// Callback handed to a callback-driven function, to send values to the consumer
pub struct Emitter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Emitter<T> {
    /// Send a value to the consumer. Never blocks.
    ///
    /// Returns `false` if the bridge is closing, in which case the value is
    /// discarded. The function may use this to stop early.
    pub fn emit(&self, value: T) -> bool {
        if self.shared.closing() {
            return false;
        }
        self.shared.deliver(Envelope::Value(value));
        true
    }

    /// If the bridge is closing and further values will be discarded
    pub fn is_closed(&self) -> bool {
        self.shared.closing()
    }
}

/// Runs the function once, on the first step
struct CallbackSource<T, F> {
    run: Option<F>,
    emitter: Emitter<T>,
}
impl<T, F> Advance for CallbackSource<T, F>
where
    F: FnOnce(&Emitter<T>) -> crate::Result<()>,
{
    type Item = T;
    type Input = ();
    fn advance(&mut self, input: Input<()>) -> Envelope<T> {
        if let Input::Throw(error) = input {
            return Envelope::Error(error);
        }
        let Some(run) = self.run.take() else {
            return Envelope::End;
        };
        match run(&self.emitter) {
            Ok(()) => Envelope::End,
            Err(error) => Envelope::Error(error),
        }
    }
}

/// A blocking function that emits values through a callback, driven by a
/// worker thread and consumed asynchronously.
///
/// The function is called once on the worker thread with an [`Emitter`].
/// Every emitted value becomes an item, in order. When the function returns,
/// the iteration ends. If it returns an error, the error is the last item.
///
/// Closing the bridge early cannot interrupt the function. It keeps running
/// in the background (unless it checks [`Emitter::is_closed`]), and its values
/// are discarded. For this reason, by default closing does not wait for it.
///
/// ```rust
/// # use pistonite_athread as athread;
/// fn scan(on_found: impl Fn(u32)) {
///     for i in 0..5 {
///         on_found(i * i);
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> athread::Result<()> {
/// let found = athread::iterate_callback(|emitter| {
///     scan(|x| { emitter.emit(x); });
///     Ok(())
/// }).collect().await?;
/// assert_eq!(found, [0, 1, 4, 9, 16]);
/// # Ok(()) }
/// ```
pub struct IterateCallback<T> {
    bridge: Bridge<T, ()>,
}

impl<T: Send + 'static> IterateCallback<T> {
    pub(crate) fn new<F>(executor: Arc<dyn Executor>, config: Config, run: F) -> Self
    where
        F: FnOnce(&Emitter<T>) -> crate::Result<()> + Send + 'static,
    {
        let bridge = Bridge::new(
            Shape::Callback,
            executor,
            config,
            move |worker: Worker<T, ()>| {
                worker.run(move |shared| CallbackSource {
                    run: Some(run),
                    emitter: Emitter {
                        shared: Arc::clone(shared),
                    },
                })
            },
        );
        Self { bridge }
    }

    /// Start the worker, which calls the function
    pub fn open(&mut self) -> crate::Result<()> {
        self.bridge.open()
    }

    /// Get the next emitted value.
    ///
    /// Returns `None` after the function returned and all values are consumed.
    /// If the function returned an error, it's returned once after all the values
    /// emitted before it.
    pub async fn next(&mut self) -> Option<crate::Result<T>> {
        self.bridge.pull().await.into_option()
    }

    /// Stop delivering values.
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

    /// Open the bridge and collect all values.
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

    /// Open the bridge, wait for exactly one value, then close the bridge.
    ///
    /// If the function returns without emitting, [`ProtocolViolation::NoValue`]
    /// is returned. Values emitted after the first are discarded.
    ///
    /// If the returned future is dropped before completion, the function
    /// keeps running in the background and its result is discarded.
    pub async fn single(mut self) -> crate::Result<T> {
        self.open()?;
        let first = self.bridge.pull().await;
        self.close().await;
        match first {
            Envelope::Value(value) => Ok(value),
            Envelope::Error(error) => Err(error),
            Envelope::End => Err(ProtocolViolation::NoValue.into()),
        }
    }
}
