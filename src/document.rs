//! Document model: the in-memory directory record, the volume lifecycle record, and the
//! per-category granular roll-up record. These are the three document shapes published to
//! the index backend (spec.md §3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::classify;

/// The subset of `lstat` we need: size, atime, mode bits, owning uid.
#[derive(Debug, Clone, Copy)]
pub struct InodeStat {
    pub size: u64,
    pub atime: DateTime<Utc>,
    pub mode: u32,
    pub uid: u32,
}

impl InodeStat {
    pub fn lstat(path: &Path) -> io::Result<InodeStat> {
        let meta = std::fs::symlink_metadata(path)?;
        let atime = DateTime::from_timestamp(meta.atime(), meta.atime_nsec() as u32)
            .unwrap_or_else(Utc::now);
        Ok(InodeStat {
            size: meta.len(),
            atime,
            mode: meta.mode(),
            uid: meta.uid(),
        })
    }
}

/// True when `lstat`'s error is the "transient per-inode" kind spec.md §7 demotes to a
/// warning (the file moved or became unreadable under the scanner) rather than the "abort"
/// kind that ends the whole volume scan.
pub fn is_transient_inode_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    )
}

/// Coerce a path to the backend's Latin-1-safe wire representation: trailing `/` stripped,
/// then every raw byte reinterpreted as the Unicode code point of the same value (the
/// behavior of "encode UTF-8 with surrogate-escape, decode ISO-8859-1" on the raw OS bytes
/// Rust already hands us, per spec.md §6). This never fails and never drops a byte.
pub fn path_to_wire_string(path: &Path) -> String {
    let bytes = path.as_os_str().as_bytes();
    let trimmed = {
        let mut end = bytes.len();
        while end > 1 && bytes[end - 1] == b'/' {
            end -= 1;
        }
        &bytes[..end]
    };
    trimmed.iter().map(|&b| b as char).collect()
}

/// Count and size of everything absorbed into a bucket (spec.md §3: `{count, size}`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BucketStat {
    pub count: u64,
    pub size: u64,
}

impl BucketStat {
    fn add(&mut self, size: u64) {
        self.count += 1;
        self.size += size;
    }
}

/// One directory document: the directory itself plus everything absorbed into it.
///
/// Built by `construct`, optionally grown by repeated `incorporate_child` calls, then frozen
/// and handed by value to Stage C. Concurrent `incorporate_child` calls on the same document
/// (from a Stage-A worker's Stage-B threads) must be externally serialized — callers hold
/// this behind an `Arc<Mutex<DirDocument>>` (see `pipeline::stage_a`); the struct itself has
/// no internal lock because no call path here re-enters it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirDocument {
    pub path: String,
    pub scan_id: String,
    pub start_timestamp: DateTime<Utc>,

    pub size: u64,
    pub count: u64,

    pub owner: String,
    pub atime: DateTime<Utc>,
    pub filetype: String,

    pub includes_children: bool,
    pub mean_heat: f64,

    pub filetypes: HashMap<String, BucketStat>,
    pub size_bins: HashMap<String, BucketStat>,
    pub heat_bins: HashMap<String, BucketStat>,
    pub users: HashMap<String, BucketStat>,
}

impl DirDocument {
    /// Initialize a document with one inode's contribution. If `stat` is `None`, it is
    /// obtained via `lstat(path)`; a transient `lstat` error is logged and `None` is
    /// returned (the caller silently drops the task, per spec.md §4.2).
    pub fn construct(
        path: &Path,
        start_timestamp: DateTime<Utc>,
        scan_id: String,
        stat: Option<InodeStat>,
    ) -> Option<DirDocument> {
        let stat = match stat {
            Some(s) => s,
            None => match InodeStat::lstat(path) {
                Ok(s) => s,
                Err(err) if is_transient_inode_error(&err) => {
                    log::warn!("skipping {}: {}", path.display(), err);
                    return None;
                }
                Err(err) => {
                    log::warn!(
                        "skipping {} (unexpected lstat error): {}",
                        path.display(),
                        err
                    );
                    return None;
                }
            },
        };

        let owner = classify::username_from_uid(stat.uid);
        let filetype = classify::detect_filetype(path, stat.mode);
        let size_key = classify::size_band(stat.size);
        let age = classify::age_seconds(start_timestamp, stat.atime);
        let heat_key = classify::heat_band(age);

        let mut filetypes = HashMap::new();
        filetypes
            .entry(filetype.clone())
            .or_insert_with(BucketStat::default)
            .add(stat.size);
        let mut size_bins = HashMap::new();
        size_bins
            .entry(size_key.to_string())
            .or_insert_with(BucketStat::default)
            .add(stat.size);
        let mut heat_bins = HashMap::new();
        heat_bins
            .entry(heat_key.to_string())
            .or_insert_with(BucketStat::default)
            .add(stat.size);
        let mut users = HashMap::new();
        users
            .entry(owner.clone())
            .or_insert_with(BucketStat::default)
            .add(stat.size);

        Some(DirDocument {
            path: path_to_wire_string(path),
            scan_id,
            start_timestamp,
            size: stat.size,
            count: 1,
            owner,
            atime: stat.atime,
            filetype,
            includes_children: false,
            mean_heat: age as f64,
            filetypes,
            size_bins,
            heat_bins,
            users,
        })
    }

    /// Fold one more inode's stats into this document. A transient `lstat` error is logged
    /// and the child is skipped (`Ok(())`); any other I/O error propagates so the caller can
    /// set the shared abort signal (spec.md §4.5, §7).
    pub fn incorporate_child(&mut self, path: &Path, stat: Option<InodeStat>) -> io::Result<()> {
        let stat = match stat {
            Some(s) => s,
            None => match InodeStat::lstat(path) {
                Ok(s) => s,
                Err(err) if is_transient_inode_error(&err) => {
                    log::warn!("skipping {}: {}", path.display(), err);
                    return Ok(());
                }
                Err(err) => return Err(err),
            },
        };

        self.size += stat.size;
        self.count += 1;

        let filetype = classify::detect_filetype(path, stat.mode);
        self.filetypes.entry(filetype).or_default().add(stat.size);

        let size_key = classify::size_band(stat.size).to_string();
        self.size_bins.entry(size_key).or_default().add(stat.size);

        let age = classify::age_seconds(self.start_timestamp, stat.atime);
        let heat_key = classify::heat_band(age).to_string();
        self.heat_bins.entry(heat_key).or_default().add(stat.size);

        let owner = classify::username_from_uid(stat.uid);
        self.users.entry(owner).or_default().add(stat.size);

        self.mean_heat =
            (self.mean_heat * (self.count - 1) as f64 + age as f64) / self.count as f64;
        self.includes_children = true;

        Ok(())
    }
}

/// Lifecycle status of a volume scan. `in_progress -> complete` on success, `in_progress ->
/// failed` on abort, `complete -> removed` when superseded by a later complete scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    InProgress,
    Complete,
    Failed,
    Removed,
}

/// One volume scan's lifecycle and post-scan rollups (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeDocument {
    pub path: String,
    pub start_timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    pub status: ScanStatus,

    /// Backend-assigned id; absent until the document has been created in the index.
    #[serde(skip)]
    pub scan_id: Option<String>,

    pub vol_size: u64,
    pub vol_size_avail: u64,
    pub vol_size_used: u64,
    pub vol_count: u64,
    pub vol_count_avail: u64,
    pub vol_count_used: u64,

    pub fs_type: String,
    pub fs_spec: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_heat: Option<f64>,
}

impl VolumeDocument {
    pub fn new(path: String, start_timestamp: DateTime<Utc>) -> VolumeDocument {
        VolumeDocument {
            path,
            start_timestamp,
            end_timestamp: None,
            length: None,
            status: ScanStatus::InProgress,
            scan_id: None,
            vol_size: 0,
            vol_size_avail: 0,
            vol_size_used: 0,
            vol_count: 0,
            vol_count_avail: 0,
            vol_count_used: 0,
            fs_type: "__unknown_fs_type__".to_string(),
            fs_spec: "__unknown_fs_spec__".to_string(),
            size: None,
            count: None,
            mean_heat: None,
        }
    }
}

/// One post-scan roll-up row (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GranularRecord {
    pub path: String,
    pub scan_id: String,
    pub category: String,
    pub identifier: String,
    pub size: u64,
    pub count: u64,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(size: u64, atime: DateTime<Utc>, mode: u32, uid: u32) -> InodeStat {
        InodeStat {
            size,
            atime,
            mode,
            uid,
        }
    }

    #[test]
    fn construct_single_inode_invariants() {
        let now = Utc::now();
        let s = stat(5, now, libc::S_IFREG, 0);
        let doc =
            DirDocument::construct(Path::new("/t/a.txt"), now, "scan-1".into(), Some(s)).unwrap();
        assert_eq!(doc.size, 5);
        assert_eq!(doc.count, 1);
        assert!(!doc.includes_children);
    }

    #[test]
    fn incorporate_child_keeps_bucket_sums_consistent() {
        let now = Utc::now();
        let root = stat(0, now, libc::S_IFDIR, 0);
        let mut doc =
            DirDocument::construct(Path::new("/t"), now, "scan-1".into(), Some(root)).unwrap();
        doc.incorporate_child(Path::new("/t/a.txt"), Some(stat(5, now, libc::S_IFREG, 0)))
            .unwrap();
        doc.incorporate_child(
            Path::new("/t/b.bin"),
            Some(stat(15, now, libc::S_IFREG, 1000)),
        )
        .unwrap();

        assert_eq!(doc.size, 20);
        assert_eq!(doc.count, 3);
        assert!(doc.includes_children);

        let sum = |m: &HashMap<String, BucketStat>| m.values().map(|b| b.size).sum::<u64>();
        assert_eq!(sum(&doc.filetypes), doc.size);
        assert_eq!(sum(&doc.size_bins), doc.size);
        assert_eq!(sum(&doc.heat_bins), doc.size);
        assert_eq!(sum(&doc.users), doc.size);

        let count_sum = |m: &HashMap<String, BucketStat>| m.values().map(|b| b.count).sum::<u64>();
        assert_eq!(count_sum(&doc.filetypes), doc.count);
        assert_eq!(count_sum(&doc.users), doc.count);
    }

    #[test]
    fn mean_heat_is_arithmetic_mean_of_ages() {
        let now = Utc::now();
        let root = stat(0, now - chrono::Duration::seconds(100), libc::S_IFDIR, 0);
        let mut doc =
            DirDocument::construct(Path::new("/t"), now, "scan-1".into(), Some(root)).unwrap();
        doc.incorporate_child(
            Path::new("/t/a"),
            Some(stat(
                1,
                now - chrono::Duration::seconds(200),
                libc::S_IFREG,
                0,
            )),
        )
        .unwrap();
        doc.incorporate_child(
            Path::new("/t/b"),
            Some(stat(
                1,
                now - chrono::Duration::seconds(300),
                libc::S_IFREG,
                0,
            )),
        )
        .unwrap();
        assert!((doc.mean_heat - 200.0).abs() < 1.0);
    }

    #[test]
    fn transient_lstat_error_skips_construction() {
        let now = Utc::now();
        let doc =
            DirDocument::construct(Path::new("/does/not/exist/at/all"), now, "s".into(), None);
        assert!(doc.is_none());
    }

    #[test]
    fn unresolvable_uid_is_counted_with_sentinel_owner() {
        let now = Utc::now();
        let s = stat(10, now, libc::S_IFREG, 999_999);
        let doc = DirDocument::construct(Path::new("/t/f"), now, "s".into(), Some(s)).unwrap();
        assert_eq!(doc.owner, "__unknown_uid_999999__");
        assert_eq!(doc.users["__unknown_uid_999999__"].count, 1);
    }

    #[test]
    fn path_is_stripped_of_trailing_slash() {
        assert_eq!(path_to_wire_string(Path::new("/a/b/")), "/a/b");
        assert_eq!(path_to_wire_string(Path::new("/")), "/");
    }
}
