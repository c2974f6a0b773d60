//! Stage A: the scan worker pool. Each worker owns a private Stage-B absorb pool and turns
//! one [`ScanTask`] into one frozen [`DirDocument`] handed to Stage C.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::document::DirDocument;
use crate::pipeline::stage_b::{AbsorbItem, spawn_stage_b_pool};
use crate::queue::{AbortSignal, QueueConsumer, QueueProducer, cancellable_queue};
use crate::walker::ScanTask;

/// Spawn `worker_count` Stage-A workers. Each pulls tasks from `input`, emits finished
/// documents to `sink`, and tears down its own Stage-B pool before exiting.
pub fn spawn_stage_a_pool(
    worker_count: usize,
    threads_per_worker: usize,
    absorb_queue_capacity: usize,
    input: QueueConsumer<ScanTask>,
    sink: QueueProducer<DirDocument>,
    shutdown: Arc<AtomicBool>,
    abort: AbortSignal,
) -> Vec<JoinHandle<()>> {
    (0..worker_count)
        .map(|_| {
            let input = input.clone();
            let sink = sink.clone();
            let shutdown = Arc::clone(&shutdown);
            let abort = abort.clone();
            thread::spawn(move || {
                worker_loop(
                    threads_per_worker,
                    absorb_queue_capacity,
                    input,
                    sink,
                    shutdown,
                    abort,
                )
            })
        })
        .collect()
}

fn worker_loop(
    threads_per_worker: usize,
    absorb_queue_capacity: usize,
    input: QueueConsumer<ScanTask>,
    sink: QueueProducer<DirDocument>,
    shutdown: Arc<AtomicBool>,
    abort: AbortSignal,
) {
    let (absorb_producer, absorb_consumer) = cancellable_queue::<AbsorbItem>(absorb_queue_capacity);
    let inner_shutdown = Arc::new(AtomicBool::new(false));
    let stage_b_handles = spawn_stage_b_pool(
        threads_per_worker,
        absorb_consumer,
        Arc::clone(&inner_shutdown),
        abort.clone(),
    );

    loop {
        // The Coordinator only sets `shutdown` after the Walker's task producer has joined
        // (spec.md §4.7 step 3), so by the time it's observed here the input queue is
        // already empty — no outstanding task is ever dropped by this check.
        if shutdown.load(Ordering::SeqCst) || abort.is_set() {
            break;
        }
        let Some(task) = input.pop() else {
            continue;
        };
        process_task(task, &absorb_producer, &sink, &abort);
        input.task_done();
    }

    absorb_producer.join(&abort);
    inner_shutdown.store(true, Ordering::SeqCst);
    for handle in stage_b_handles {
        let _ = handle.join();
    }
}

fn process_task(
    task: ScanTask,
    absorb: &QueueProducer<AbsorbItem>,
    sink: &QueueProducer<DirDocument>,
    abort: &AbortSignal,
) {
    let Some(doc) = DirDocument::construct(
        &task.dirpath,
        task.start_timestamp,
        task.scan_id.clone(),
        None,
    ) else {
        return;
    };

    if task.walk_items {
        for file in &task.filenames {
            if let Some(file_doc) =
                DirDocument::construct(file, task.start_timestamp, task.scan_id.clone(), None)
            {
                sink.push(file_doc);
            }
        }
    }

    let doc = Arc::new(Mutex::new(doc));

    if !task.walk_items {
        for file in &task.filenames {
            absorb.push((Arc::clone(&doc), file.clone()));
        }
    }

    if task.aggregate_subdirs {
        for name in &task.dirnames {
            absorb_subtree(&doc, &task.dirpath.join(name), absorb, abort);
        }
    }

    absorb.join(abort);

    let finished = Arc::try_unwrap(doc)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_else(|shared| shared.lock().unwrap().clone());
    sink.push(finished);
}

/// Recursively push every descendant of `base` (directories and files alike) onto the
/// absorb queue as a child of `doc`, mirroring the pruned Walker's `vos.walk` recursion done
/// locally inside Stage A instead (spec.md §4.4 step 5).
fn absorb_subtree(
    doc: &Arc<Mutex<DirDocument>>,
    base: &Path,
    absorb: &QueueProducer<AbsorbItem>,
    abort: &AbortSignal,
) {
    if abort.is_set() {
        return;
    }
    absorb.push((Arc::clone(doc), base.to_path_buf()));

    let entries = match std::fs::read_dir(base) {
        Ok(e) => e,
        Err(err) => {
            log::warn!("skipping subtree {}: {}", base.display(), err);
            return;
        }
    };
    for entry in entries {
        if abort.is_set() {
            return;
        }
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                log::warn!("skipping entry under {}: {}", base.display(), err);
                continue;
            }
        };
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let path: PathBuf = entry.path();
        if is_dir {
            absorb_subtree(doc, &path, absorb, abort);
        } else {
            absorb.push((Arc::clone(doc), path));
        }
    }
}
