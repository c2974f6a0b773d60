//! Stage C: the sink. A single thread that batches documents and flushes them to the index
//! backend (spec.md §4.6).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::document::DirDocument;
use crate::index_client::IndexBackend;
use crate::queue::QueueConsumer;

/// The default "input queue empty for this long" flush trigger (spec.md §4.6).
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawn the sink thread. It drains `consumer` into a staging buffer and flushes to
/// `index_name` in `backend` when the buffer reaches `flush_threshold` items, when a pop
/// times out (after `drain_timeout`) with a non-empty buffer, or once `shutdown` is set and
/// the buffer is non-empty. A backend write failure sets `abort` and ends the thread,
/// surfacing the failure to the Coordinator via the abort signal rather than retrying
/// internally.
pub fn spawn_sink(
    consumer: QueueConsumer<DirDocument>,
    backend: Arc<dyn IndexBackend>,
    index_name: String,
    flush_threshold: usize,
    drain_timeout: Duration,
    shutdown: Arc<AtomicBool>,
    abort: crate::queue::AbortSignal,
) -> JoinHandle<()> {
    thread::spawn(move || {
        sink_loop(
            consumer,
            backend,
            index_name,
            flush_threshold,
            drain_timeout,
            shutdown,
            abort,
        )
    })
}

fn sink_loop(
    consumer: QueueConsumer<DirDocument>,
    backend: Arc<dyn IndexBackend>,
    index_name: String,
    flush_threshold: usize,
    drain_timeout: Duration,
    shutdown: Arc<AtomicBool>,
    abort: crate::queue::AbortSignal,
) {
    let mut staging: Vec<DirDocument> = Vec::new();

    loop {
        let is_shutdown = shutdown.load(Ordering::SeqCst);
        if abort.is_set() {
            return;
        }
        if is_shutdown && staging.is_empty() {
            return;
        }

        let mut timed_out = false;
        match consumer.pop_timeout(drain_timeout) {
            Some(doc) => {
                staging.push(doc);
                consumer.task_done();
            }
            None => timed_out = true,
        }

        let should_flush = staging.len() >= flush_threshold
            || (timed_out && !staging.is_empty())
            || (is_shutdown && !staging.is_empty());

        if should_flush {
            if let Err(err) = flush(&backend, &index_name, &staging) {
                log::error!("sink flush to {index_name} failed: {err}");
                abort.set();
                return;
            }
            staging.clear();
        }
    }
}

fn flush(
    backend: &Arc<dyn IndexBackend>,
    index_name: &str,
    staging: &[DirDocument],
) -> anyhow::Result<()> {
    let docs: Vec<(String, serde_json::Value)> = staging
        .iter()
        .map(|doc| {
            let value = serde_json::to_value(doc).expect("DirDocument always serializes");
            (String::new(), value)
        })
        .collect();
    backend.bulk_index(index_name, &docs)
}
