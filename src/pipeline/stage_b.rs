//! Stage B: the absorb thread pool living inside one Stage-A worker.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::document::DirDocument;
use crate::queue::{AbortSignal, QueueConsumer};

pub type AbsorbItem = (Arc<Mutex<DirDocument>>, PathBuf);

/// Spawn `thread_count` absorb threads sharing `consumer`. Each thread pulls `(document,
/// path)` pairs and folds `path` into `document`. A non-transient I/O error sets `abort` and
/// ends that thread without calling `task_done` on the offending item — mirroring the
/// original's "set the flag, then let the exception propagate" shutdown.
pub fn spawn_stage_b_pool(
    thread_count: usize,
    consumer: QueueConsumer<AbsorbItem>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    abort: AbortSignal,
) -> Vec<JoinHandle<()>> {
    (0..thread_count)
        .map(|_| {
            let consumer = consumer.clone();
            let shutdown = Arc::clone(&shutdown);
            let abort = abort.clone();
            thread::spawn(move || absorb_loop(consumer, shutdown, abort))
        })
        .collect()
}

fn absorb_loop(
    consumer: QueueConsumer<AbsorbItem>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    abort: AbortSignal,
) {
    use std::sync::atomic::Ordering;
    loop {
        if shutdown.load(Ordering::SeqCst) || abort.is_set() {
            break;
        }
        let Some((doc, path)) = consumer.pop() else {
            continue;
        };
        let result = doc.lock().unwrap().incorporate_child(&path, None);
        match result {
            Ok(()) => consumer.task_done(),
            Err(err) => {
                log::error!("absorb of {} failed: {}", path.display(), err);
                abort.set();
                break;
            }
        }
    }
}
