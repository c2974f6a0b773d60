//! Logging setup.

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Initialize the process-wide logger. `verbose` maps to our own crate's level; every
/// dependency stays at `Warn` so a scan over a huge tree doesn't drown in walker chatter.
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                env!("CARGO_PKG_NAME"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
