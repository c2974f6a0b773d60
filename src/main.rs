//! gws-scanner CLI: scan a single volume, or run the daemon over a configured list of them.

use anyhow::Result;
use clap::Parser;
use gws_scanner::cli::{Cli, Commands};
use gws_scanner::config::GwsScannerConfig;
use gws_scanner::coordinator::{self, ScanSettings};
use gws_scanner::daemon::{self, DaemonOptions};
use gws_scanner::index_client::ElasticsearchBackend;
use gws_scanner::logging::setup_logging;
use gws_scanner::queue::AbortSignal;
use std::sync::Arc;
use std::time::Instant;

/// Install a Ctrl+C handler that sets the shared abort signal, letting an operator cancel a
/// running scan cleanly instead of killing the process.
fn install_ctrlc_abort() -> Result<AbortSignal> {
    let abort = AbortSignal::new();
    let handler_abort = abort.clone();
    ctrlc::set_handler(move || {
        handler_abort.set();
    })?;
    Ok(abort)
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            config_file,
            gws_path,
            verbose,
        } => {
            setup_logging(verbose);
            let config = GwsScannerConfig::load(&config_file)?;
            let backend: Arc<dyn gws_scanner::index_client::IndexBackend> =
                Arc::new(ElasticsearchBackend::new(config.scanner.elastic.clone())?);
            backend.ensure_indices()?;

            let settings = ScanSettings {
                scan_threads: config.scanner.scan_threads,
                scan_max_threads_per_worker: config.scanner.scan_max_threads_per_worker,
                queue_length_scale_factor: config.scanner.queue_length_scale_factor,
                elastic: config.scanner.elastic.clone(),
            };
            let gws_config = config.gws_config(&gws_path);
            let abort = install_ctrlc_abort()?;
            let volume =
                coordinator::scan_volume(backend, &settings, &gws_config, &gws_path, abort)?;
            log::info!(
                "scan of {} complete: {} bytes, {} inodes",
                gws_path.display(),
                volume.size.unwrap_or(0),
                volume.count.unwrap_or(0)
            );
        }
        Commands::Daemon {
            config_file,
            run_forever,
            verbose,
        } => {
            setup_logging(verbose);
            let config = GwsScannerConfig::load(&config_file)?;
            let backend: Arc<dyn gws_scanner::index_client::IndexBackend> =
                Arc::new(ElasticsearchBackend::new(config.scanner.elastic.clone())?);
            daemon::run(backend, &config, &DaemonOptions { run_forever })?;
        }
    }

    log::debug!("total time: {:?}", start_time.elapsed());
    Ok(())
}
