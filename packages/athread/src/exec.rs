//! # Executors
//!
//! A bridge does not own threads. It hands its worker loop, as a [`Job`],
//! to an [`Executor`], and gets a [`WorkerHandle`] back to join it on close.
//!
//! The executors here only decide *where* the job runs:
//! - [`Blocking`] (the default): the blocking pool of a `tokio` runtime.
//! - [`Threads`]: a new named OS thread for every job.
//! - [`runtime`]: a dedicated `tokio` runtime with a capped blocking pool,
//!   so a set of bridges cannot take more than a given number of threads.
//!
//! Custom executors can be made with [`WorkerHandle::track`]:
//! ```rust
//! # use pistonite_athread as athread;
//! use athread::exec::{Executor, Job, WorkerHandle};
//!
//! struct Inline;
//! impl Executor for Inline {
//!     fn submit(&self, job: Job) -> athread::Result<WorkerHandle> {
//!         let (job, handle) = WorkerHandle::track(job);
//!         std::thread::spawn(job);
//!         Ok(handle)
//!     }
//! }
//! ```
//!
//! # Threads cannot be killed
//! Closing a bridge sets a flag that the worker checks between steps.
//! A worker that is blocked *inside* a step (for example, a `read` that never
//! returns) cannot be stopped from the outside. Depending on the [`JoinPolicy`],
//! closing either waits for it, or gives up and abandons it. An abandoned
//! worker keeps running in the background until the blocking call returns,
//! and whatever it produces after that is discarded. Abandoned workers are
//! logged and counted in [`abandoned_workers`](crate::abandoned_workers).

use std::cell::Cell;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::pre::*;

/// A unit of blocking work submitted to an [`Executor`]
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a blocking function on some thread
pub trait Executor: Send + Sync + 'static {
    /// Start running the job on some thread, and return a handle to join it.
    ///
    /// The job may block the thread for a long time.
    fn submit(&self, job: Job) -> crate::Result<WorkerHandle>;
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn submit(&self, job: Job) -> crate::Result<WorkerHandle> {
        (**self).submit(job)
    }
}

/// How closing a bridge waits for its worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinPolicy {
    /// Wait until the worker returns, however long that takes
    Wait,
    /// Wait up to the duration, then abandon the worker
    Timeout(Duration),
    /// Don't wait. The worker is abandoned if it's still running
    Detach,
}

/// Result of joining a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Joined {
    /// The worker has returned
    Finished,
    /// The worker is still running, and is left to finish in the background
    Abandoned,
}

/// Handle to a job submitted to an [`Executor`]
pub struct WorkerHandle {
    done: oneshot::Receiver<()>,
    // set once the receiver has observed completion
    finished: Cell<bool>,
    abort: Option<tokio::task::AbortHandle>,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl WorkerHandle {
    /// Wrap a job so that its completion can be observed through the returned handle.
    ///
    /// The handle sees the job as finished when it returns or unwinds,
    /// or when the wrapped job is dropped without running.
    pub fn track(job: Job) -> (Job, Self) {
        let (send, done) = oneshot::channel();
        let job: Job = Box::new(move || {
            job();
            let _ = send.send(());
        });
        let handle = Self {
            done,
            finished: Cell::new(false),
            abort: None,
        };
        (job, handle)
    }

    /// Attach a `tokio` abort handle, used by [`abort`](Self::abort)
    pub fn with_abort_handle(mut self, abort: tokio::task::AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    /// If the job has returned (or will never run)
    pub fn is_finished(&self) -> bool {
        if !self.finished.get() {
            let done = !matches!(self.done.try_recv(), Err(oneshot::TryRecvError::Empty));
            self.finished.set(done);
        }
        self.finished.get()
    }

    /// Prevent the job from starting if it hasn't started yet.
    ///
    /// A job that is already running is not affected.
    pub fn abort(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    /// Wait for the job according to the policy
    pub async fn join(self, policy: JoinPolicy) -> Joined {
        if self.is_finished() {
            return Joined::Finished;
        }
        match policy {
            JoinPolicy::Wait => {
                let _ = self.done.await;
                Joined::Finished
            }
            JoinPolicy::Timeout(timeout) => {
                let abort = self.abort;
                match tokio::time::timeout(timeout, self.done).await {
                    Ok(_) => Joined::Finished,
                    Err(_) => {
                        if let Some(abort) = abort {
                            abort.abort();
                        }
                        Joined::Abandoned
                    }
                }
            }
            JoinPolicy::Detach => {
                self.abort();
                Joined::Abandoned
            }
        }
    }
}

/// the multi-threaded, background runtime, used when not inside any runtime
static BACKGROUND_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("athread-background")
        .enable_all()
        .build()
        .expect("cannot create background tokio runtime")
});

/// Run jobs on the blocking thread pool of a `tokio` runtime.
///
/// [`Blocking::current`] uses the runtime that is current when the job is
/// submitted (i.e. when the bridge is opened). If there is none, a lazily
/// created background runtime is used.
#[derive(Debug, Clone, Default)]
pub struct Blocking {
    handle: Option<Handle>,
    // keeps a dedicated runtime alive while any clone of this executor exists
    owned: Option<Arc<OwnedRuntime>>,
}

impl Blocking {
    /// Use the runtime that is current at submission
    pub fn current() -> Self {
        Self::default()
    }

    /// Use the given runtime
    pub fn on(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
            owned: None,
        }
    }

    fn handle(&self) -> Handle {
        if let Some(handle) = &self.handle {
            return handle.clone();
        }
        match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => BACKGROUND_RUNTIME.handle().clone(),
        }
    }
}

impl Executor for Blocking {
    fn submit(&self, job: Job) -> crate::Result<WorkerHandle> {
        let (job, handle) = WorkerHandle::track(job);
        let task = self.handle().spawn_blocking(job);
        Ok(handle.with_abort_handle(task.abort_handle()))
    }
}

/// Run each job on a new OS thread, named `<prefix>-<n>`
#[derive(Debug, Clone)]
pub struct Threads {
    prefix: String,
    stack_size: Option<usize>,
}

impl Default for Threads {
    fn default() -> Self {
        Self::new("athread-worker")
    }
}

impl Threads {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            stack_size: None,
        }
    }

    /// Set the stack size of spawned threads
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

impl Executor for Threads {
    fn submit(&self, job: Job) -> crate::Result<WorkerHandle> {
        let (job, handle) = WorkerHandle::track(job);
        let name = format!("{}-{}", self.prefix, crate::next_atomic_usize());
        let mut builder = std::thread::Builder::new().name(name.clone());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        // the thread is detached, completion is observed through the handle
        crate::check!(builder.spawn(job), "failed to spawn worker thread '{name}'")?;
        Ok(handle)
    }
}

/// A runtime that is shut down without blocking when the last reference is dropped,
/// so it can be dropped inside async code
#[derive(Debug)]
struct OwnedRuntime(Option<Runtime>);
impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Create a [`Blocking`] executor backed by a dedicated `tokio` runtime,
/// where at most `capacity` jobs run at the same time. Extra jobs are queued
/// until a thread is available.
///
/// - If `capacity > 0`, then literally that number of threads are allowed.
/// - If `capacity = 0`, then the number of logical processors on the system
///   is used, using the `num_cpus` crate, minimum 1.
/// - If `capacity < 0`, then the number of logical processors on the system,
///   minus the specified amount is used, minimum 1.
pub fn runtime(capacity: isize) -> crate::Result<Blocking> {
    let threads = match capacity {
        1.. => capacity as usize,
        c => {
            let n = num_cpus::get();
            n.saturating_sub(c.unsigned_abs()).max(1)
        }
    };
    crate::trace!("creating worker runtime with {threads} blocking threads");
    let runtime = crate::check!(
        Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads)
            .thread_name("athread-pool")
            .enable_all()
            .build(),
        "cannot create worker runtime with {threads} blocking threads"
    )?;
    Ok(Blocking {
        handle: Some(runtime.handle().clone()),
        owned: Some(Arc::new(OwnedRuntime(Some(runtime)))),
    })
}
