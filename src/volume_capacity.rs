//! Volume capacity snapshot: a `statvfs` on the volume root, plus a `/proc/mounts` lookup
//! for the filesystem type and device spec (spec.md §4.7a).

use crate::classify;
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Space and inode counts for the filesystem backing a path, as reported by `statvfs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapacitySnapshot {
    pub vol_size: u64,
    pub vol_size_avail: u64,
    pub vol_size_used: u64,
    pub vol_count: u64,
    pub vol_count_avail: u64,
    pub vol_count_used: u64,
}

/// Filesystem type and device spec from `/proc/mounts`, or the sentinel pair when
/// `/proc/mounts` doesn't exist (non-Linux hosts).
#[derive(Debug, Clone)]
pub struct FsIdentity {
    pub fs_type: String,
    pub fs_spec: String,
}

/// `statvfs(path)`. Forces the filesystem to mount first the way the original does (a
/// `read_dir` touch), since some network filesystems only get mounted on first access.
pub fn capacity_snapshot(path: &Path) -> io::Result<CapacitySnapshot> {
    let _ = std::fs::read_dir(path)?;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut vfs: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut vfs) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    let frsize = vfs.f_frsize as u64;
    Ok(CapacitySnapshot {
        vol_size: vfs.f_blocks as u64 * frsize,
        vol_size_avail: vfs.f_bavail as u64 * frsize,
        vol_size_used: (vfs.f_blocks as u64 - vfs.f_bfree as u64) * frsize,
        vol_count: vfs.f_files as u64,
        vol_count_avail: vfs.f_favail as u64,
        vol_count_used: vfs.f_files as u64 - vfs.f_ffree as u64,
    })
}

/// Filesystem type/spec for `path`, falling back to the `__unknown_*__` sentinels when
/// `/proc/mounts` can't be read or nothing matches.
pub fn fs_identity(path: &Path) -> FsIdentity {
    match classify::mount_info(path) {
        Some(info) => FsIdentity {
            fs_type: info.fs_vfstype,
            fs_spec: info.fs_spec,
        },
        None => FsIdentity {
            fs_type: "__unknown_fs_type__".to_string(),
            fs_spec: "__unknown_fs_spec__".to_string(),
        },
    }
}
