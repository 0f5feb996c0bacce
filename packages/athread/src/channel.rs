use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One unit of worker output
#[derive(Debug)]
pub enum Envelope<T> {
    /// A produced value
    Value(T),
    /// The source failed. Always the last envelope of a bridge
    Error(crate::Error),
    /// No more values
    End,
}

impl<T> Envelope<T> {
    /// Convert to the shape returned by `next()`: `None` at the end
    pub fn into_option(self) -> Option<crate::Result<T>> {
        match self {
            Self::Value(v) => Some(Ok(v)),
            Self::Error(e) => Some(Err(e)),
            Self::End => None,
        }
    }

    /// If this envelope ends the sequence
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Value(_))
    }
}

/// FIFO mailbox between the worker thread and the consumer.
///
/// The lock is only held to push or pop, never across an `.await`
/// or a call into the source.
#[derive(Debug)]
pub(crate) struct Channel<T>(Mutex<VecDeque<Envelope<T>>>);

impl<T> Channel<T> {
    pub(crate) fn new() -> Self {
        Self(Mutex::new(VecDeque::new()))
    }

    // nothing panics while holding the lock
    fn lock(&self) -> MutexGuard<'_, VecDeque<Envelope<T>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, envelope: Envelope<T>) {
        self.lock().push_back(envelope);
    }

    pub(crate) fn pop(&self) -> Option<Envelope<T>> {
        self.lock().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Discard everything in the channel, return how many were discarded
    pub(crate) fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        // drop the items outside of the lock
        drained.len()
    }
}
