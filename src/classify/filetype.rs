//! File-type classification: mode bits first, MIME-guess fallback for regular files.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Detect the canonical file-type token for `path` given its `lstat` mode bits.
///
/// Directories and non-regular inodes get a reserved `__xxx__` token. Regular files fall
/// through to MIME sniffing from the path's suffix; unknown extensions get
/// `__unknown_file__`. Every `.` and `/` in the resulting token is replaced with `__` so
/// the token is safe to use as a dynamic field name in the index backend.
pub fn detect_filetype(path: &Path, mode: u32) -> String {
    let fmt = mode & libc::S_IFMT;
    let token = match fmt {
        libc::S_IFDIR => "__directory__",
        libc::S_IFCHR => "__character_device__",
        libc::S_IFBLK => "__block_device__",
        libc::S_IFIFO => "__named_pipe__",
        libc::S_IFLNK => "__symlink__",
        libc::S_IFSOCK => "__socket__",
        libc::S_IFREG => {
            return mime_guess::from_path(path)
                .first()
                .map(|m| m.essence_str().replace(['.', '/'], "__"))
                .unwrap_or_else(|| "__unknown_file__".to_string());
        }
        _ => "__unknown__",
    };
    token.to_string()
}

/// `detect_filetype` from a `std::fs::Metadata` (the common case — callers already have the
/// `lstat` result from walking or absorbing).
pub fn detect_filetype_from_metadata(path: &Path, meta: &std::fs::Metadata) -> String {
    detect_filetype(path, meta.mode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn directory_mode_is_reserved_token() {
        assert_eq!(
            detect_filetype(Path::new("/tmp"), libc::S_IFDIR),
            "__directory__"
        );
    }

    #[test]
    fn regular_file_known_extension() {
        assert_eq!(
            detect_filetype(Path::new("a.txt"), libc::S_IFREG),
            "text__plain"
        );
    }

    #[test]
    fn regular_file_unknown_extension() {
        assert_eq!(
            detect_filetype(Path::new("a.bafflegab"), libc::S_IFREG),
            "__unknown_file__"
        );
    }

    #[test]
    fn symlink_mode_is_reserved_token() {
        assert_eq!(
            detect_filetype(Path::new("l"), libc::S_IFLNK),
            "__symlink__"
        );
    }
}
