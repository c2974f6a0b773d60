//! Error taxonomy for the scan pipeline.
//!
//! Transient per-inode errors (`NotFound`/`PermissionDenied` on `lstat`) and transient
//! backend errors (aggregate query timeouts) never become a [`ScanError`] — they're
//! logged with `log::warn!` at the call site and the scan continues. Only the two
//! propagating categories from the error handling design get a variant here.

use thiserror::Error;

/// Errors that end a single volume scan (`Abort`) or the whole process (`Fatal`).
#[derive(Debug, Error)]
pub enum ScanError {
    /// An absorb worker saw an `OSError` other than not-found/permission-denied, or the
    /// backend reported an unrecoverable error mid-scan. The volume document is
    /// transitioned to `failed` before this is returned.
    #[error("scan aborted: {0}")]
    Abort(String),

    /// Misconfiguration or an unreachable backend at startup. No volume document is
    /// created for a fatal error.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
