pub use anyhow::{Context, Error, Ok, Result, anyhow as fmterr, bail};

/// # Error Handling
///
/// Errors are [`anyhow`](https://docs.rs/anyhow) errors, re-exported as
/// `athread::Error` and `athread::Result`.
///
/// An error raised by the blocking source is moved across the thread boundary
/// as-is. It is not wrapped or stringified, so the consumer can recover
/// the original type:
/// ```rust
/// # use pistonite_athread as athread;
/// #[derive(Debug)]
/// struct Oops;
/// impl std::fmt::Display for Oops {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "oops")
///     }
/// }
/// impl std::error::Error for Oops {}
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> athread::Result<()> {
/// let source = vec![Ok(1), Err(Oops)];
/// let mut it = athread::try_iterate(source);
/// it.open()?;
/// assert_eq!(it.next().await.transpose()?, Some(1));
/// let err = it.next().await.unwrap().unwrap_err();
/// assert!(err.downcast_ref::<Oops>().is_some());
/// it.close().await;
/// # Ok(()) }
/// ```
///
/// Errors produced by the bridge itself are typed, see [`ProtocolViolation`]
/// and [`WorkerPanic`].
///
/// `athread::check!` wraps `.with_context()`
#[macro_export]
macro_rules! check {
    ($result:expr, $($args:tt)*) => {{
        { $result }.with_context(|| format!($($args)*))
    }};
}

/// Rethrow an `Err`, optionally with additional context
///
/// Prelude import is required to bring in the Context trait.
#[macro_export]
macro_rules! rethrow {
    ($result:expr) => {
        return Err($result);
    };
    ($result:expr, $($args:tt)*) => {{
        return Err($result).context(format!($($args)*));
    }};
}

/// The bridge was used in a way its protocol does not allow.
///
/// These are raised at the call that violates the protocol, and never
/// involve the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ProtocolViolation {
    /// Pulling or sending before the bridge is opened
    #[display("the bridge is not open, call `open` or `scope` first")]
    NotOpen,
    /// Opening a bridge that was already opened once
    #[display("the bridge was already opened")]
    AlreadyOpen,
    /// Sending a value (or delivering an error) into a generator
    /// that has not reached its first yield
    #[display("the generator must be started with `send(None)` before sending a value")]
    NotPrimed,
    /// A single-result run returned without emitting a value
    #[display("the function returned without emitting a value")]
    NoValue,
    /// Opening a bridge that is already closed
    #[display("the bridge is closed")]
    Closed,
}

/// A panic escaped a worker step and was caught on the worker thread.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("worker panicked: {info}")]
pub struct WorkerPanic {
    #[error(not(source))]
    pub info: String,
}
