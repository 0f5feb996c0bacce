use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering, fence};
use std::sync::{Arc, mpsc};

use crate::atomic::{Lifecycle, State};
use crate::channel::{Channel, Envelope};
use crate::exec::{Executor, JoinPolicy, Joined, WorkerHandle};
use crate::signal::Signal;
use crate::{Config, ProtocolViolation, WorkerPanic};

/// The kind of blocking source behind a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Shape {
    /// An iterator, advanced with `next`
    #[display("iterate")]
    Pull,
    /// A generator, resumed with a sent value
    #[display("generate")]
    Exchange,
    /// A function emitting values through a callback
    #[display("callback")]
    Callback,
}

impl Shape {
    /// The join policy used when none is configured.
    ///
    /// Iterators and generators are checked for the closing flag between steps,
    /// so they are waited for. A callback-driven function is never interrupted
    /// by close, so it's not waited for.
    pub fn default_join(self) -> JoinPolicy {
        match self {
            Self::Pull | Self::Exchange => JoinPolicy::Wait,
            Self::Callback => JoinPolicy::Detach,
        }
    }
}

/// Input for one worker step
pub(crate) enum Input<I> {
    /// Advance the source, optionally sending a value into it
    Resume(Option<I>),
    /// Deliver an error into the source
    Throw(crate::Error),
}

/// Message from the consumer to a worker that runs on demand
enum Request<I> {
    /// Run one step with the input
    Step(Input<I>),
    /// Run this many steps without waiting for a request
    Credit(usize),
}

/// One step of a blocking source, run on the worker thread.
///
/// This is the only thing the worker loop knows about the source.
pub(crate) trait Advance {
    type Item;
    type Input;
    fn advance(&mut self, input: Input<Self::Input>) -> Envelope<Self::Item>;
}

/// State shared between the worker thread and the consumer
pub(crate) struct Shared<T> {
    channel: Channel<T>,
    signal: Signal,
    state: Lifecycle,
    /// The worker is inside a call into the source
    stepping: AtomicBool,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            channel: Channel::new(),
            signal: Signal::new(),
            state: Lifecycle::new(),
            stepping: AtomicBool::new(false),
        }
    }

    /// Worker side: mark the start of a step, return false if the bridge
    /// is closing and the step must not run.
    ///
    /// Pairs with [`in_step`](Self::in_step): either the worker sees the
    /// closing flag, or the consumer sees the step.
    fn enter_step(&self) -> bool {
        self.stepping.store(true, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        if self.state.closing() {
            self.stepping.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    fn leave_step(&self) {
        self.stepping.store(false, Ordering::SeqCst);
    }

    /// Consumer side, after the closing flag is set: if the worker
    /// may still be inside a step
    fn in_step(&self) -> bool {
        fence(Ordering::SeqCst);
        self.stepping.load(Ordering::SeqCst)
    }

    /// Enqueue then notify, from the worker side
    pub(crate) fn deliver(&self, envelope: Envelope<T>) {
        self.channel.push(envelope);
        self.signal.notify();
    }

    #[inline]
    pub(crate) fn closing(&self) -> bool {
        self.state.closing()
    }

    /// Set the closing flag and wake the consumer. Both are needed:
    /// a waiting consumer needs the wakeup, and a consumer that is
    /// about to check needs the flag.
    fn drain(&self) {
        self.state.drain();
        self.signal.notify();
    }

    /// Get the next envelope, suspending until one is available or the bridge
    /// is closing.
    ///
    /// The channel is checked after waking up instead of trusting the flag,
    /// so the last item pushed right before the flag is set is not lost.
    async fn recv(&self) -> Envelope<T> {
        if !self.state.closing() || !self.channel.is_empty() {
            self.signal.wait().await;
            if let Some(envelope) = self.channel.pop() {
                return envelope;
            }
        }
        Envelope::End
    }
}

static ABANDONED_WORKERS: AtomicUsize = AtomicUsize::new(0);

/// Number of workers that were still running when their bridge was closed
/// or dropped, in this process.
///
/// Those workers are left to finish in the background. Anything they produce
/// after the bridge is closed is discarded. See [`exec`](crate::exec) for why.
pub fn abandoned_workers() -> usize {
    ABANDONED_WORKERS.load(Ordering::Acquire)
}

fn report_abandoned(id: usize, shape: Shape, expected: bool) {
    ABANDONED_WORKERS.fetch_add(1, Ordering::AcqRel);
    if expected {
        crate::debug!("[{shape} #{id}] worker detached while still running");
    } else {
        crate::warn!(
            "[{shape} #{id}] worker is still running after close, abandoning it. it may be blocked in a call that never returns"
        );
    }
}

fn panic_error(payload: Box<dyn Any + Send + 'static>) -> crate::Error {
    let info = crate::best_effort_panic_info(&*payload).to_string();
    WorkerPanic { info }.into()
}

/// The worker side of a bridge, moved to the worker thread
pub(crate) struct Worker<T, I> {
    id: usize,
    shape: Shape,
    shared: Arc<Shared<T>>,
    requests: Option<mpsc::Receiver<Request<I>>>,
}

/// Runs when the worker loop exits in any way, including unwinding
struct Teardown<'a, T>(&'a Shared<T>);
impl<T> Drop for Teardown<'_, T> {
    fn drop(&mut self) {
        self.0.leave_step();
        self.0.drain();
    }
}

impl<T, I> Worker<T, I> {
    /// Build the source on this thread with `make`, then run the worker loop
    pub(crate) fn run<S, F>(self, make: F)
    where
        S: Advance<Item = T, Input = I>,
        F: FnOnce(&Arc<Shared<T>>) -> S,
    {
        let Self {
            id,
            shape,
            shared,
            requests,
        } = self;
        let _teardown = Teardown(&shared);
        crate::trace!("[{shape} #{id}] worker started");

        if !shared.enter_step() {
            return;
        }
        let mut source = match catch_unwind(AssertUnwindSafe(|| make(&shared))) {
            Ok(source) => {
                shared.leave_step();
                source
            }
            Err(payload) => {
                let error = panic_error(payload);
                crate::error!("[{shape} #{id}] {error}");
                shared.deliver(Envelope::Error(error));
                return;
            }
        };

        let mut steps = 0usize;
        let mut credit = 0usize;
        loop {
            if shared.closing() {
                crate::trace!("[{shape} #{id}] closing flag observed");
                break;
            }
            let input = match &requests {
                None => Input::Resume(None),
                Some(_) if credit > 0 => {
                    credit -= 1;
                    Input::Resume(None)
                }
                Some(requests) => match requests.recv() {
                    Ok(Request::Step(input)) => input,
                    Ok(Request::Credit(n)) => {
                        credit = n;
                        continue;
                    }
                    // consumer hung up
                    Err(_) => break,
                },
            };
            if !shared.enter_step() {
                break;
            }
            let envelope = match catch_unwind(AssertUnwindSafe(|| source.advance(input))) {
                Ok(envelope) => envelope,
                Err(payload) => {
                    let error = panic_error(payload);
                    crate::error!("[{shape} #{id}] {error}");
                    Envelope::Error(error)
                }
            };
            shared.leave_step();
            steps += 1;
            if shared.closing() {
                // produced after close, nobody will receive it
                crate::trace!("[{shape} #{id}] discarding output produced after close");
                break;
            }
            match envelope {
                Envelope::Value(value) => shared.deliver(Envelope::Value(value)),
                Envelope::Error(error) => {
                    crate::debug!("[{shape} #{id}] source failed: {error}");
                    shared.deliver(Envelope::Error(error));
                    break;
                }
                Envelope::End => break,
            }
        }
        crate::trace!("[{shape} #{id}] worker exiting after {steps} steps");
    }
}

type Launch<T, I> = Box<dyn FnOnce(Worker<T, I>) + Send + 'static>;

/// One worker thread and one consumer over one open/close cycle.
///
/// The front-ends are thin wrappers over this.
pub(crate) struct Bridge<T, I> {
    id: usize,
    shape: Shape,
    shared: Arc<Shared<T>>,
    executor: Arc<dyn Executor>,
    config: Config,
    launch: Option<Launch<T, I>>,
    requests: Option<mpsc::Sender<Request<I>>>,
    worker: Option<WorkerHandle>,
    /// The consumer has seen the end or an error
    finished: bool,
    /// A request was sent, and its response was not pulled yet
    in_flight: bool,
}

impl<T: Send + 'static, I: Send + 'static> Bridge<T, I> {
    pub(crate) fn new<L>(shape: Shape, executor: Arc<dyn Executor>, config: Config, launch: L) -> Self
    where
        L: FnOnce(Worker<T, I>) + Send + 'static,
    {
        Self {
            id: crate::next_atomic_usize(),
            shape,
            shared: Arc::new(Shared::new()),
            executor,
            config,
            launch: Some(Box::new(launch)),
            requests: None,
            worker: None,
            finished: false,
            in_flight: false,
        }
    }

    /// Number of steps the worker may run ahead of requests, or `None`
    /// if the worker runs without requests
    fn prefetch(&self) -> Option<usize> {
        match self.shape {
            Shape::Pull => self.config.max_buffered,
            Shape::Exchange => Some(0),
            Shape::Callback => None,
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> State {
        self.shared.state.get()
    }

    #[inline]
    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// Start the worker. `Unopened -> Open`
    pub(crate) fn open(&mut self) -> crate::Result<()> {
        match self.state() {
            State::Unopened => {}
            State::Closed => return Err(ProtocolViolation::Closed.into()),
            _ => return Err(ProtocolViolation::AlreadyOpen.into()),
        }
        let Some(launch) = self.launch.take() else {
            return Err(ProtocolViolation::AlreadyOpen.into());
        };
        if !self.shared.state.open() {
            return Err(ProtocolViolation::AlreadyOpen.into());
        }
        let (requests, receiver) = match self.prefetch() {
            None => (None, None),
            Some(prefetch) => {
                let (send, recv) = mpsc::channel();
                if prefetch > 0 {
                    let _ = send.send(Request::Credit(prefetch));
                }
                (Some(send), Some(recv))
            }
        };
        let worker = Worker {
            id: self.id,
            shape: self.shape,
            shared: Arc::clone(&self.shared),
            requests: receiver,
        };
        match self.executor.submit(Box::new(move || launch(worker))) {
            Ok(handle) => {
                crate::debug!("[{} #{}] opened", self.shape, self.id);
                self.worker = Some(handle);
                self.requests = requests;
                Ok(())
            }
            Err(e) => {
                self.shared.state.close();
                self.finished = true;
                Err(e)
            }
        }
    }

    /// Send an input to the worker, return false if the worker is not taking inputs
    fn request(&mut self, input: Input<I>) -> bool {
        let sent = match &self.requests {
            Some(requests) => requests.send(Request::Step(input)).is_ok(),
            None => false,
        };
        if sent {
            self.in_flight = true;
        }
        sent
    }

    /// Pull the response of the request in flight
    async fn respond(&mut self) -> Envelope<T> {
        let envelope = self.pull().await;
        self.in_flight = false;
        envelope
    }

    /// Pull the next item, requesting one more step unless a request
    /// is already in flight.
    ///
    /// If a previous call was cancelled after its request was sent,
    /// the response to that request is the next item.
    pub(crate) async fn next_item(&mut self) -> Envelope<T> {
        if !self.in_flight && !self.finished {
            self.request(Input::Resume(None));
        }
        self.respond().await
    }

    /// Wait for the response of a request whose caller stopped waiting,
    /// and discard it. Returns the envelope if it ended the bridge.
    pub(crate) async fn settle(&mut self) -> Option<Envelope<T>> {
        if !self.in_flight {
            return None;
        }
        let stale = self.respond().await;
        if stale.is_terminal() {
            return Some(stale);
        }
        crate::debug!(
            "[{} #{}] discarding response of a cancelled request",
            self.shape,
            self.id
        );
        None
    }

    /// Send one input and wait for its response, after settling
    /// any request left from a cancelled call.
    pub(crate) async fn exchange(&mut self, input: Input<I>) -> Envelope<T> {
        if let Some(end) = self.settle().await {
            return end;
        }
        if !self.finished {
            self.request(input);
        }
        self.respond().await
    }

    /// Pull one envelope. Only one pull may be in progress at a time,
    /// which is enforced by `&mut self`.
    pub(crate) async fn pull(&mut self) -> Envelope<T> {
        if self.finished {
            return Envelope::End;
        }
        match self.state() {
            State::Unopened => return Envelope::Error(ProtocolViolation::NotOpen.into()),
            State::Closed => return Envelope::End,
            State::Open | State::Draining => {}
        }
        let envelope = self.shared.recv().await;
        if envelope.is_terminal() {
            self.finished = true;
        }
        envelope
    }

    /// Close the bridge. `Open -> Draining -> Closed`.
    ///
    /// Production stops, the worker is joined according to the [`JoinPolicy`],
    /// and items that were not consumed are discarded. Calling this more than
    /// once is fine.
    pub(crate) async fn close(&mut self) {
        let policy = self.config.join.unwrap_or(self.shape.default_join());
        self.close_with(policy).await
    }

    /// Close the bridge, joining the worker with `policy`
    pub(crate) async fn close_with(&mut self, policy: JoinPolicy) {
        match self.state() {
            State::Closed => return,
            State::Unopened => {
                self.launch = None;
                self.finished = true;
                self.shared.state.close();
                return;
            }
            State::Open | State::Draining => {}
        }
        self.interrupt();
        if let Some(worker) = self.worker.take() {
            match worker.join(policy).await {
                Joined::Finished => {
                    crate::trace!("[{} #{}] worker joined", self.shape, self.id)
                }
                Joined::Abandoned if self.shared.in_step() => {
                    report_abandoned(self.id, self.shape, policy == JoinPolicy::Detach)
                }
                Joined::Abandoned => {
                    crate::trace!(
                        "[{} #{}] worker is exiting between steps",
                        self.shape,
                        self.id
                    )
                }
            }
        }
        let discarded = self.shared.channel.clear();
        if discarded > 0 {
            crate::debug!(
                "[{} #{}] discarded {discarded} unconsumed items",
                self.shape,
                self.id
            );
        }
        self.shared.state.close();
        crate::debug!("[{} #{}] closed", self.shape, self.id);
    }
}

impl<T, I> Bridge<T, I> {
    /// The part of closing that doesn't wait
    fn interrupt(&mut self) {
        self.finished = true;
        self.in_flight = false;
        self.requests = None;
        self.shared.drain();
    }
}

impl<T, I> Drop for Bridge<T, I> {
    fn drop(&mut self) {
        if !matches!(self.shared.state.get(), State::Open | State::Draining) {
            return;
        }
        // can't join here, do the non-blocking part of close
        self.interrupt();
        if let Some(worker) = self.worker.take()
            && !worker.is_finished()
        {
            worker.abort();
            // a worker waiting for requests exits on its own
            if self.shared.in_step() {
                let policy = self.config.join.unwrap_or(self.shape.default_join());
                report_abandoned(self.id, self.shape, policy == JoinPolicy::Detach);
            }
        }
        self.shared.state.close();
    }
}
