use std::convert::Infallible;
use std::sync::Arc;

use crate::exec::{Blocking, Executor, JoinPolicy};
use crate::{Config, Emitter, Generate, Generator, Iterate, IterateCallback};

/// Captures an executor and a [`Config`], and creates bridges from them.
///
/// The crate-level functions like [`athread::iterate`](crate::iterate) use
/// `Builder::default()`, which runs workers on the blocking pool of the
/// current `tokio` runtime with the default config.
///
/// ```rust
/// # use pistonite_athread as athread;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> athread::Result<()> {
/// let builder = athread::Builder::default()
///     .executor(athread::exec::Threads::new("reader"))
///     .max_buffered(Some(4));
/// let lines = builder.iterate(["x", "y"]).collect().await?;
/// assert_eq!(lines, ["x", "y"]);
/// let n = builder.call(|| Ok(40 + 2)).await?;
/// assert_eq!(n, 42);
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Builder {
    executor: Arc<dyn Executor>,
    config: Config,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            executor: Arc::new(Blocking::current()),
            config: Config::default(),
        }
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Set the executor that runs the workers
    pub fn executor(mut self, executor: impl Executor) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    /// Replace the whole config
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// See [`Config::max_buffered`]
    pub fn max_buffered(mut self, max_buffered: Option<usize>) -> Self {
        self.config.max_buffered = max_buffered;
        self
    }

    /// See [`Config::join`]
    pub fn join(mut self, join: JoinPolicy) -> Self {
        self.config.join = Some(join);
        self
    }

    /// Bridge an infallible iterable, moved to the worker thread
    pub fn iterate<I>(&self, source: I) -> Iterate<I::Item>
    where
        I: IntoIterator + Send + 'static,
        I::Item: Send + 'static,
    {
        self.iterate_with(move || source)
    }

    /// Bridge an infallible iterable created on the worker thread by `factory`.
    ///
    /// Use this when the iterator itself is not `Send`.
    pub fn iterate_with<F, I>(&self, factory: F) -> Iterate<I::Item>
    where
        F: FnOnce() -> I + Send + 'static,
        I: IntoIterator,
        I::Item: Send + 'static,
    {
        self.try_iterate_with(move || factory().into_iter().map(Ok::<_, Infallible>))
    }

    /// Bridge an iterable of `Result`s, moved to the worker thread.
    ///
    /// The first `Err` is delivered as an error, and ends the iteration.
    pub fn try_iterate<I, T, E>(&self, source: I) -> Iterate<T>
    where
        I: IntoIterator<Item = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<crate::Error>,
    {
        self.try_iterate_with(move || source)
    }

    /// Bridge an iterable of `Result`s created on the worker thread by `factory`
    pub fn try_iterate_with<F, I, T, E>(&self, factory: F) -> Iterate<T>
    where
        F: FnOnce() -> I + Send + 'static,
        I: IntoIterator<Item = Result<T, E>>,
        T: Send + 'static,
        E: Into<crate::Error>,
    {
        Iterate::new(Arc::clone(&self.executor), self.config, factory)
    }

    /// Bridge a generator, moved to the worker thread
    pub fn generate<G>(&self, generator: G) -> Generate<G::Yield, G::Input>
    where
        G: Generator + Send + 'static,
        G::Yield: Send + 'static,
        G::Input: Send + 'static,
    {
        self.generate_with(move || generator)
    }

    /// Bridge a generator created on the worker thread by `factory`
    pub fn generate_with<F, G>(&self, factory: F) -> Generate<G::Yield, G::Input>
    where
        F: FnOnce() -> G + Send + 'static,
        G: Generator,
        G::Yield: Send + 'static,
        G::Input: Send + 'static,
    {
        Generate::new(Arc::clone(&self.executor), self.config, factory)
    }

    /// Bridge a function that emits values through a callback
    pub fn iterate_callback<T, F>(&self, run: F) -> IterateCallback<T>
    where
        T: Send + 'static,
        F: FnOnce(&Emitter<T>) -> crate::Result<()> + Send + 'static,
    {
        IterateCallback::new(Arc::clone(&self.executor), self.config, run)
    }

    /// Run a function that emits exactly one value through a callback,
    /// and wait for that value. See [`IterateCallback::single`].
    pub async fn single_callback<T, F>(&self, run: F) -> crate::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Emitter<T>) -> crate::Result<()> + Send + 'static,
    {
        self.iterate_callback(run).single().await
    }

    /// Run a blocking function on a worker thread and wait for its result.
    ///
    /// If the returned future is dropped (for example, the task is aborted),
    /// the function keeps running in the background and its result is discarded.
    pub async fn call<R, F>(&self, f: F) -> crate::Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> crate::Result<R> + Send + 'static,
    {
        self.single_callback(move |emitter| {
            emitter.emit(f()?);
            Ok(())
        })
        .await
    }
}
