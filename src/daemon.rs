//! Daemon loop: continuously rescan every configured volume, tracking consecutive
//! failures and giving up once `fail_threshold` is reached (spec.md Design Notes; grounded
//! on the original `daemon.py` main loop, minus its OAuth2 service-discovery step — this
//! build reads the volume list directly from `[scanner.daemon] volumes` in the config).

use anyhow::anyhow;
use std::sync::Arc;

use crate::config::GwsScannerConfig;
use crate::coordinator::{self, ScanSettings};
use crate::error::{Result, ScanError};
use crate::index_client::IndexBackend;
use crate::queue::AbortSignal;

pub struct DaemonOptions {
    pub run_forever: bool,
}

/// Run the daemon loop once (or forever, per `options.run_forever`) over the configured
/// volume list, scanning each in turn and applying the fail-threshold policy.
///
/// A fresh `AbortSignal` is created per volume so a Ctrl+C during one scan (or a worker
/// failure) does not poison the next volume's scan in the same run.
pub fn run(
    backend: Arc<dyn IndexBackend>,
    config: &GwsScannerConfig,
    options: &DaemonOptions,
) -> Result<()> {
    backend.ensure_indices().map_err(ScanError::Fatal)?;

    let settings = ScanSettings {
        scan_threads: config.scanner.scan_threads,
        scan_max_threads_per_worker: config.scanner.scan_max_threads_per_worker,
        queue_length_scale_factor: config.scanner.queue_length_scale_factor,
        elastic: config.scanner.elastic.clone(),
    };

    let mut fail_count: u32 = 0;
    let mut total_successful_scans: u64 = 0;

    loop {
        let volumes = config.scanner.daemon.volumes.clone();
        log::info!("loaded {} volumes to scan", volumes.len());

        for raw in volumes {
            let gws = raw.trim_end_matches('/').to_string();
            let path = std::path::Path::new(&gws);

            if std::fs::read_dir(path).is_err() {
                log::warn!("{gws} does not exist, skipping");
                continue;
            }

            log::info!("started scan of {gws}");
            let gws_config = config.gws_config(path);
            let abort = AbortSignal::new();
            match coordinator::scan_volume(
                Arc::clone(&backend),
                &settings,
                &gws_config,
                path,
                abort,
            ) {
                Ok(_) => {
                    total_successful_scans += 1;
                    fail_count = 0;
                    log::info!(
                        "successfully scanned {gws}. {total_successful_scans} scans completed in total."
                    );
                }
                Err(ScanError::Abort(msg)) => {
                    log::error!("scan of {gws} aborted: {msg}");
                    if fail_count >= config.scanner.daemon.fail_threshold {
                        log::error!("failure threshold reached, exiting");
                        return Err(ScanError::Fatal(anyhow!(
                            "daemon exiting after {} consecutive scan failures",
                            fail_count + 1
                        )));
                    }
                    fail_count += 1;
                    log::warn!(
                        "{fail_count} failures so far, will exit at {}",
                        config.scanner.daemon.fail_threshold
                    );
                }
                Err(err @ ScanError::Fatal(_)) => return Err(err),
            }
        }

        if !options.run_forever {
            break;
        }
    }

    Ok(())
}
