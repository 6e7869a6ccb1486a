//! Work queue of pending identifiers
//!
//! The backlog is filled once at startup. Each dequeued id is wrapped in a
//! [`QueuedId`] guard; dropping the guard acknowledges the item, and
//! [`WorkQueue::join`] resolves once every enqueued id has been acknowledged.

use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

struct QueueInner {
    items: Mutex<VecDeque<u32>>,
    pending: AtomicUsize,
    drained: Notify,
    total: usize,
}

/// Shared FIFO backlog; clones refer to the same queue
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<QueueInner>,
}

/// An identifier taken from the queue
///
/// The item counts as done once this value is dropped.
pub struct QueuedId {
    pub id: u32,
    _ack: Ack,
}

struct Ack {
    inner: Arc<QueueInner>,
}

impl Drop for Ack {
    fn drop(&mut self) {
        if self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

impl WorkQueue {
    /// Creates a queue holding `ids` in the given order
    pub fn new(ids: Vec<u32>) -> Self {
        let total = ids.len();
        Self {
            inner: Arc::new(QueueInner {
                items: Mutex::new(ids.into()),
                pending: AtomicUsize::new(total),
                drained: Notify::new(),
                total,
            }),
        }
    }

    /// Creates a queue holding `ids` in random order
    pub fn shuffled(mut ids: Vec<u32>) -> Self {
        ids.shuffle(&mut rand::thread_rng());
        Self::new(ids)
    }

    /// Takes the next identifier, or `None` once the backlog is empty
    pub fn next(&self) -> Option<QueuedId> {
        let id = self
            .inner
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()?;

        Some(QueuedId {
            id,
            _ack: Ack {
                inner: Arc::clone(&self.inner),
            },
        })
    }

    /// Identifiers not yet dequeued
    pub fn len(&self) -> usize {
        self.inner
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers not yet acknowledged (queued or in flight)
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Identifiers enqueued at construction
    pub fn total(&self) -> usize {
        self.inner.total
    }

    /// Waits until every enqueued identifier has been acknowledged
    pub async fn join(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}
