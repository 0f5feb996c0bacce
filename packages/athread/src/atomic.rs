use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

/// An atomic `u8` storage viewed as a type `T`.
///
/// `Acquire` ordering is used for load and `Release` ordering is used for store.
#[derive(Debug)]
pub(crate) struct Atomic<T>(AtomicU8, PhantomData<T>)
where
    T: From<u8> + Into<u8>;

impl<T: From<u8> + Into<u8>> Atomic<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(AtomicU8::new(value.into()), PhantomData)
    }
    pub(crate) fn get(&self) -> T {
        self.0.load(Ordering::Acquire).into()
    }
    pub(crate) fn set(&self, value: T) {
        self.0.store(value.into(), Ordering::Release)
    }
    /// Change the value from `from` to `to`, return false if the current
    /// value is not `from`
    pub(crate) fn transition(&self, from: T, to: T) -> bool {
        self.0
            .compare_exchange(from.into(), to.into(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// State of a bridge over one open/close cycle.
///
/// The states only move forward:
/// `Unopened -> Open -> Draining -> Closed`. A bridge that is never opened
/// may go from `Unopened` to `Closed` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum State {
    /// Created, worker not started
    Unopened,
    /// Worker started, items may still be produced
    Open,
    /// A terminal condition was reached (exhausted, failed, or close requested),
    /// no new items will be produced
    Draining,
    /// Worker joined or abandoned, channel torn down
    Closed,
}
impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Unopened,
            1 => Self::Open,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }
}
impl From<State> for u8 {
    fn from(value: State) -> Self {
        value as Self
    }
}

/// The closing flag shared by the worker and the consumer
#[derive(Debug)]
pub(crate) struct Lifecycle(Atomic<State>);
impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(Atomic::new(State::Unopened))
    }
    #[inline]
    pub(crate) fn get(&self) -> State {
        self.0.get()
    }
    /// `Unopened -> Open`, returns false if the bridge was opened before
    pub(crate) fn open(&self) -> bool {
        self.0.transition(State::Unopened, State::Open)
    }
    /// `Open -> Draining`, returns true if this call made the transition
    pub(crate) fn drain(&self) -> bool {
        self.0.transition(State::Open, State::Draining)
    }
    /// Move to `Closed` from any state
    pub(crate) fn close(&self) {
        self.0.set(State::Closed)
    }
    /// If the closing flag is set (draining or closed)
    #[inline]
    pub(crate) fn closing(&self) -> bool {
        self.get() >= State::Draining
    }
}
