//! Mount table lookup: `/proc/mounts` (fstab 6-column form), longest-prefix match.

use std::path::Path;

/// One row of `/proc/mounts`: `{spec, file, vfstype, mntops, freq, passno}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub fs_spec: String,
    pub fs_file: String,
    pub fs_vfstype: String,
    pub fs_mntops: String,
    pub fs_freq: String,
    pub fs_passno: String,
}

/// Find the mount covering `path`: among every mount point that is a prefix of `path`, the
/// one with the longest mount-point string wins. Returns `None` when `/proc/mounts` is
/// unreadable (non-Linux hosts) or nothing matches; callers substitute
/// `__unknown_fs_type__`/`__unknown_fs_spec__` per spec.md §4.1.
pub fn mount_info(path: &Path) -> Option<MountInfo> {
    let raw = std::fs::read_to_string("/proc/mounts").ok()?;
    mount_info_from_str(&raw, &path.to_string_lossy())
}

fn mount_info_from_str(raw: &str, path: &str) -> Option<MountInfo> {
    raw.lines()
        .filter_map(|line| {
            let items: Vec<&str> = line.split_whitespace().collect();
            if items.len() < 6 {
                return None;
            }
            if path.starts_with(items[1]) {
                Some(items)
            } else {
                None
            }
        })
        .max_by_key(|items| items[1].len())
        .map(|items| MountInfo {
            fs_spec: items[0].to_string(),
            fs_file: items[1].to_string(),
            fs_vfstype: items[2].to_string(),
            fs_mntops: items[3].to_string(),
            fs_freq: items[4].to_string(),
            fs_passno: items[5].to_string(),
        })
}
