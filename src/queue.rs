//! A bounded, joinable, abort-aware work queue.
//!
//! Stands in for the original's `multiprocessing.JoinableQueue` plus its `threading.Event`
//! abort signal: `push` blocks while the queue is full, `pop` blocks with a timeout so a
//! worker can notice `abort` without receiving an item, and `join` blocks until every pushed
//! item has had a matching `task_done` — or until `abort` is set, whichever comes first.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

const POP_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared abort flag. Any worker in the pipeline can set it; every other worker is expected
/// to check it on its poll loop and unwind within one `POP_TIMEOUT`.
#[derive(Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> AbortSignal {
        AbortSignal(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Outstanding {
    count: Mutex<usize>,
    drained: Condvar,
}

/// A `Sender`-like handle: cloneable, used by producers.
pub struct QueueProducer<T> {
    sender: Sender<T>,
    outstanding: Arc<Outstanding>,
}

impl<T> Clone for QueueProducer<T> {
    fn clone(&self) -> Self {
        QueueProducer {
            sender: self.sender.clone(),
            outstanding: Arc::clone(&self.outstanding),
        }
    }
}

impl<T> QueueProducer<T> {
    /// Blocks while the queue is full. Counts the item as outstanding before it's visible to
    /// consumers, so a concurrent `join` can never observe a false "empty".
    pub fn push(&self, item: T) {
        {
            let mut count = self.outstanding.count.lock().unwrap();
            *count += 1;
        }
        if self.sender.send(item).is_err() {
            // Receiver side is gone; undo the reservation so a waiting `join` doesn't hang.
            let mut count = self.outstanding.count.lock().unwrap();
            *count -= 1;
            if *count == 0 {
                self.outstanding.drained.notify_all();
            }
        }
    }

    /// Blocks until `abort` fires or every pushed item has a matching `task_done`.
    pub fn join(&self, abort: &AbortSignal) {
        let mut count = self.outstanding.count.lock().unwrap();
        while *count > 0 && !abort.is_set() {
            let (guard, timeout) = self
                .outstanding
                .drained
                .wait_timeout(count, Duration::from_millis(200))
                .unwrap();
            count = guard;
            let _ = timeout;
        }
    }
}

/// A `Receiver`-like handle: cloneable, used by a worker pool draining the same queue.
pub struct QueueConsumer<T> {
    receiver: Receiver<T>,
    outstanding: Arc<Outstanding>,
}

impl<T> Clone for QueueConsumer<T> {
    fn clone(&self) -> Self {
        QueueConsumer {
            receiver: self.receiver.clone(),
            outstanding: Arc::clone(&self.outstanding),
        }
    }
}

impl<T> QueueConsumer<T> {
    /// Waits up to `timeout` for an item. `None` means "nothing arrived in time" — the
    /// caller's poll loop should re-check its shutdown/abort signals and retry. Production
    /// call sites pass [`POP_TIMEOUT`]; tests pass something short so they don't stall.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// `pop_timeout` with the default 10-second poll interval (spec.md §4.6).
    pub fn pop(&self) -> Option<T> {
        self.pop_timeout(POP_TIMEOUT)
    }

    /// Marks one previously-popped item as fully processed; wakes a waiting `join` once the
    /// outstanding count reaches zero.
    pub fn task_done(&self) {
        let mut count = self.outstanding.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.outstanding.drained.notify_all();
        }
    }
}

/// A `(count, size)` cap: `capacity` slots, shared across however many producer/consumer
/// threads hold a clone of either half.
pub fn cancellable_queue<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    let (sender, receiver) = bounded(capacity);
    let outstanding = Arc::new(Outstanding {
        count: Mutex::new(0),
        drained: Condvar::new(),
    });
    (
        QueueProducer {
            sender,
            outstanding: Arc::clone(&outstanding),
        },
        QueueConsumer {
            receiver,
            outstanding,
        },
    )
}
