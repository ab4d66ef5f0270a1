//! VFS error types.
//!
//! Backends report every failure through one umbrella kind, [`VfsError::Io`],
//! whose message says what went wrong. Only principal rebinding has its own
//! kind, [`VfsError::AccessDenied`].

use std::io;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Any backend-facing failure: malformed path, unreachable or closed
    /// backend, backend-level permission denial, non-empty directory, ...
    #[error("I/O error: {0}")]
    Io(String),

    /// The backend refused to rebind a file to a principal.
    #[error("access denied: {0}")]
    AccessDenied(String),
}

impl VfsError {
    /// Create an Io error for a missing node.
    pub fn not_found(path: impl AsRef<str>) -> Self {
        Self::Io(format!("not found: {}", path.as_ref()))
    }

    /// Create an Io error for a node that already exists.
    pub fn already_exists(path: impl AsRef<str>) -> Self {
        Self::Io(format!("already exists: {}", path.as_ref()))
    }

    /// Create an Io error for an operation that needs a directory.
    pub fn not_a_directory(path: impl AsRef<str>) -> Self {
        Self::Io(format!("not a directory: {}", path.as_ref()))
    }

    /// Create an Io error for an operation that needs content.
    pub fn is_a_directory(path: impl AsRef<str>) -> Self {
        Self::Io(format!("is a directory: {}", path.as_ref()))
    }

    /// Create an Io error for deleting a directory that still has children.
    pub fn directory_not_empty(path: impl AsRef<str>) -> Self {
        Self::Io(format!("directory not empty: {}", path.as_ref()))
    }

    /// Create an Io error for a malformed path.
    pub fn invalid_path(path: impl AsRef<str>) -> Self {
        Self::Io(format!("invalid path: {}", path.as_ref()))
    }

    /// Create an Io error for a backend-level permission denial.
    pub fn permission_denied(path: impl AsRef<str>) -> Self {
        Self::Io(format!("permission denied: {}", path.as_ref()))
    }

    /// Create an Io error for use after close.
    pub fn closed() -> Self {
        Self::Io("file system is closed".into())
    }

    /// Create an AccessDenied error.
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    /// Create an Io error with a free-form message.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Returns true for principal rebinding failures.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }
}

impl From<io::Error> for VfsError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Convert VfsError to std::io::Error for host-API channels.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::Io(msg) => io::Error::other(msg),
            VfsError::AccessDenied(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
