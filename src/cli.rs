//! Command-line surface: `gws-scanner scan` and `gws-scanner daemon`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "gws-scanner",
    about = "Catalogs a shared filesystem volume into a search index"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a single volume once and exit.
    Scan {
        /// Path to the main scanner TOML configuration.
        #[arg(long = "config", value_name = "FILE")]
        config_file: PathBuf,

        /// The volume to scan.
        gws_path: PathBuf,

        /// Emit debug-level logs for this crate.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Continuously rescan every volume listed in the configuration's `[scanner.daemon]`
    /// table.
    Daemon {
        #[arg(long = "config", value_name = "FILE")]
        config_file: PathBuf,

        /// Keep looping after one full pass over the volume list instead of exiting.
        #[arg(long)]
        run_forever: bool,

        #[arg(short, long)]
        verbose: bool,
    },
}
