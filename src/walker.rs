//! The Walker: a single-threaded, depth-first traversal of a volume that hands each
//! directory to Stage A as a [`ScanTask`], pruning recursion wherever the directory's own
//! task will absorb its subtree instead (spec.md §4.1).

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};

use crate::config::GwsConfig;
use crate::queue::{AbortSignal, QueueProducer};

/// One directory's worth of work for Stage A: its own inode plus everything immediately
/// inside it, with the policy decisions the Walker already made baked in.
#[derive(Debug, Clone)]
pub struct ScanTask {
    pub dirpath: PathBuf,
    /// Only populated when `aggregate_subdirs` is set — the immediate subdirectory names
    /// Stage A itself must walk and absorb, since the Walker won't visit them separately.
    pub dirnames: Vec<String>,
    pub filenames: Vec<PathBuf>,
    pub walk_items: bool,
    pub aggregate_subdirs: bool,
    pub start_timestamp: DateTime<Utc>,
    pub scan_id: String,
}

/// Walk `volume_path` depth-first, pushing one [`ScanTask`] per directory onto `producer`.
/// Stops early if `abort` is set. Returns the number of tasks pushed.
pub fn walk(
    volume_path: &Path,
    gws_config: &GwsConfig,
    start_timestamp: DateTime<Utc>,
    scan_id: &str,
    producer: &QueueProducer<ScanTask>,
    abort: &AbortSignal,
) -> io::Result<usize> {
    let scan_depth = gws_config.scan_depth.unwrap_or(100_000);
    let mut count = 0usize;
    walk_dir(
        volume_path,
        1,
        scan_depth,
        gws_config,
        start_timestamp,
        scan_id,
        producer,
        abort,
        &mut count,
    )?;
    Ok(count)
}

#[allow(clippy::too_many_arguments)]
fn walk_dir(
    dirpath: &Path,
    depth: u32,
    scan_depth: u32,
    gws_config: &GwsConfig,
    start_timestamp: DateTime<Utc>,
    scan_id: &str,
    producer: &QueueProducer<ScanTask>,
    abort: &AbortSignal,
    count: &mut usize,
) -> io::Result<()> {
    if abort.is_set() {
        return Ok(());
    }

    let mut dirnames = Vec::new();
    let mut filenames = Vec::new();
    for entry in std::fs::read_dir(dirpath)? {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                log::warn!("skipping entry under {}: {}", dirpath.display(), err);
                continue;
            }
        };
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                log::warn!("skipping {}: {}", entry.path().display(), err);
                continue;
            }
        };
        if meta.is_dir() {
            dirnames.push(entry.file_name().to_string_lossy().to_string());
        } else {
            filenames.push(entry.path());
        }
    }

    let dirpath_str = dirpath.to_string_lossy().to_string();
    let base_name = dirpath
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let walk_items = gws_config
        .full_item_walk_dirs
        .iter()
        .any(|d| d == &dirpath_str);
    let aggregate_subdirs = depth >= scan_depth
        || gws_config
            .aggregate_subdir_paths
            .iter()
            .any(|d| d == &dirpath_str)
        || gws_config
            .aggregate_subdir_names
            .iter()
            .any(|n| n == &base_name);

    let task_dirnames = if aggregate_subdirs {
        dirnames.clone()
    } else {
        Vec::new()
    };

    *count += 1;
    producer.push(ScanTask {
        dirpath: dirpath.to_path_buf(),
        dirnames: task_dirnames,
        filenames,
        walk_items,
        aggregate_subdirs,
        start_timestamp,
        scan_id: scan_id.to_string(),
    });

    if !aggregate_subdirs {
        for name in dirnames {
            if abort.is_set() {
                break;
            }
            walk_dir(
                &dirpath.join(name),
                depth + 1,
                scan_depth,
                gws_config,
                start_timestamp,
                scan_id,
                producer,
                abort,
                count,
            )?;
        }
    }

    Ok(())
}
