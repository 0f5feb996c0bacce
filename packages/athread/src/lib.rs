//! Drive blocking code from async code, on worker threads
//!
//! # General Principal
//! `athread` moves blocking, thread-confined code (iterators, generators,
//! and functions that report values through a callback) to a worker thread,
//! and exposes it as something you can `.await` on without blocking the
//! async runtime.
//!
//! The API is short: common functions are exported directly
//! and used as `athread::xxx`, and sub-functionalities live in short
//! submodules like [`athread::exec`](exec).
//!
//! The only time to use `use` to import from `athread`, is with the prelude module
//! `pre`:
//! ```rust
//! # use pistonite_athread as athread;
//! use athread::pre::*;
//! ```
//!
//! # Bridges
//! Each bridge runs one worker on an [`Executor`](exec::Executor) and is consumed
//! by one async task.
//!
//! | Source | Create with | Consume with |
//! |-|-|-|
//! | `Iterator` | [`iterate`], [`try_iterate`], [`iterate_with`] | [`Iterate::next`] |
//! | [`Generator`] | [`generate`], [`generate_with`] | [`Generate::send`], [`Generate::throw`] |
//! | `FnOnce(&Emitter)` | [`iterate_callback`] | [`IterateCallback::next`] |
//! | one value | [`single_callback`], [`call`] | `.await` |
//!
//! A bridge is created unopened. The worker is started by `open()`, and
//! is stopped by `close().await`. `scope` does both around an async closure,
//! so the bridge is closed on every path:
//! ```rust
//! # use pistonite_athread as athread;
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> athread::Result<()> {
//! let first = athread::iterate(0..).scope(async |it| {
//!     // the rest of the (infinite) iterator is never produced
//!     it.next().await.transpose()
//! }).await?;
//! assert_eq!(first, Some(0));
//! # Ok(()) }
//! ```
//!
//! Dropping a bridge that is still open does the part of closing that doesn't
//! need to wait. This is what happens when a task using it is aborted.
//!
//! Values, errors and the end of the source are delivered in the order they are
//! produced. An error from the source is delivered once, then the bridge ends.
//! See [`Error`] for how errors are preserved.
//!
//! # Blocked workers
//! A worker blocked inside a call that never returns cannot be stopped. See
//! [`exec`] for what closing does with it, and [`abandoned_workers`] to observe it.
//!
//! # `log` integration
//! The crate logs with `log`, at `debug` for lifecycle events and `trace` for
//! worker steps. The `release-nolog` and `release-nodebuglog` features turn
//! them off statically. When setting up tests, you can use [`log_init`] to
//! quickly initialize logging.

mod atomic;
pub use atomic::State;
mod signal;
mod channel;
pub use channel::Envelope;

mod bridge;
pub use bridge::{Shape, abandoned_workers};

pub mod exec;
mod config;
pub use config::Config;
mod builder;
pub use builder::Builder;

mod iterate;
pub use iterate::Iterate;
mod generate;
pub use generate::{FnGenerator, Generate, Generator, ThrowPolicy, generator_fn};
mod callback;
pub use callback::{Emitter, IterateCallback};

mod print;
pub use print::log_init;

mod misc;
pub(crate) use misc::*;

mod error_handling;
pub use error_handling::*;

// re-exports from libraries
pub use log::{debug, error, info, trace, warn};

/// Prelude imports
pub mod pre {
    pub use crate::Context as _;
}

/// Bridge an infallible iterable, using the default [`Builder`]
pub fn iterate<I>(source: I) -> Iterate<I::Item>
where
    I: IntoIterator + Send + 'static,
    I::Item: Send + 'static,
{
    Builder::default().iterate(source)
}

/// Bridge an infallible iterable created on the worker thread, using the default [`Builder`]
pub fn iterate_with<F, I>(factory: F) -> Iterate<I::Item>
where
    F: FnOnce() -> I + Send + 'static,
    I: IntoIterator,
    I::Item: Send + 'static,
{
    Builder::default().iterate_with(factory)
}

/// Bridge an iterable of `Result`s, using the default [`Builder`]
pub fn try_iterate<I, T, E>(source: I) -> Iterate<T>
where
    I: IntoIterator<Item = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<Error>,
{
    Builder::default().try_iterate(source)
}

/// Bridge an iterable of `Result`s created on the worker thread, using the default [`Builder`]
pub fn try_iterate_with<F, I, T, E>(factory: F) -> Iterate<T>
where
    F: FnOnce() -> I + Send + 'static,
    I: IntoIterator<Item = std::result::Result<T, E>>,
    T: Send + 'static,
    E: Into<Error>,
{
    Builder::default().try_iterate_with(factory)
}

/// Bridge a generator, using the default [`Builder`]
pub fn generate<G>(generator: G) -> Generate<G::Yield, G::Input>
where
    G: Generator + Send + 'static,
    G::Yield: Send + 'static,
    G::Input: Send + 'static,
{
    Builder::default().generate(generator)
}

/// Bridge a generator created on the worker thread, using the default [`Builder`]
pub fn generate_with<F, G>(factory: F) -> Generate<G::Yield, G::Input>
where
    F: FnOnce() -> G + Send + 'static,
    G: Generator,
    G::Yield: Send + 'static,
    G::Input: Send + 'static,
{
    Builder::default().generate_with(factory)
}

/// Bridge a function that emits values through a callback, using the default [`Builder`]
pub fn iterate_callback<T, F>(run: F) -> IterateCallback<T>
where
    T: Send + 'static,
    F: FnOnce(&Emitter<T>) -> Result<()> + Send + 'static,
{
    Builder::default().iterate_callback(run)
}

/// Run a function that emits one value through a callback and wait for it,
/// using the default [`Builder`]
pub async fn single_callback<T, F>(run: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Emitter<T>) -> Result<()> + Send + 'static,
{
    Builder::default().single_callback(run).await
}

/// Run a blocking function on a worker thread and wait for its result,
/// using the default [`Builder`]
///
/// ```rust
/// # use pistonite_athread as athread;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> athread::Result<()> {
/// let len = athread::call(|| {
///     std::thread::sleep(std::time::Duration::from_millis(10));
///     Ok("hello".len())
/// }).await?;
/// assert_eq!(len, 5);
/// # Ok(()) }
/// ```
pub async fn call<R, F>(f: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R> + Send + 'static,
{
    Builder::default().call(f).await
}
