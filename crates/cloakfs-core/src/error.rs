//! Error taxonomy shared by all storage backends.
//!
//! Variants mirror the conditions a POSIX host can act on; the errno mapping
//! itself lives mount-side so this crate stays free of `libc`.

use std::io;

use thiserror::Error;

/// Result alias used throughout the storage layer.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a backend operation can surface to the dispatcher.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Path missing in the backing tree.
    #[error("path not found: {0}")]
    NotFound(String),

    /// A directory was required but the backing target is a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A file was required but the backing target is a directory.
    #[error("is a directory: {0}")]
    IsDirectory(String),

    /// The backing target already exists.
    #[error("already exists: {0}")]
    Exists(String),

    /// rmdir on a directory that still has entries.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// The host rejected the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Unknown or already-freed virtual descriptor.
    #[error("unknown descriptor: {0}")]
    BadDescriptor(u64),

    /// Negative size, malformed key, bad block size, and similar.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No registered prefix matches the path.
    #[error("no backend registered for {0}")]
    NoBackend(String),

    /// A path component failed to decode (bad base64 or bad tag).
    #[error("undecodable name: {0}")]
    InvalidName(String),

    /// Rename whose source and destination live in different backends.
    #[error("cross-device rename: {0}")]
    CrossDevice(String),

    /// Anything else from the backing store.
    #[error("i/o error: {0}")]
    Io(io::Error),
}

impl StoreError {
    /// Classify an I/O error from an operation on `path`.
    ///
    /// Kinds with a taxonomy counterpart keep the path as context; the rest
    /// stay as raw I/O errors.
    pub fn from_io(err: io::Error, path: impl Into<String>) -> Self {
        use io::ErrorKind;

        let path = path.into();
        match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(path),
            ErrorKind::PermissionDenied => StoreError::Permission(path),
            ErrorKind::AlreadyExists => StoreError::Exists(path),
            ErrorKind::NotADirectory => StoreError::NotADirectory(path),
            ErrorKind::IsADirectory => StoreError::IsDirectory(path),
            ErrorKind::DirectoryNotEmpty => StoreError::NotEmpty(path),
            ErrorKind::CrossesDevices => StoreError::CrossDevice(path),
            ErrorKind::InvalidInput => StoreError::InvalidArgument(path),
            _ => StoreError::Io(err),
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        let context = err.to_string();
        StoreError::from_io(err, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kind_classification() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            StoreError::from_io(err, "/a"),
            StoreError::NotFound(p) if p == "/a"
        ));

        let err = io::Error::new(io::ErrorKind::DirectoryNotEmpty, "busy");
        assert!(matches!(
            StoreError::from_io(err, "/d"),
            StoreError::NotEmpty(_)
        ));

        let err = io::Error::other("backing store exploded");
        assert!(matches!(StoreError::from_io(err, "/x"), StoreError::Io(_)));
    }

    #[test]
    fn from_io_error_via_question_mark() {
        fn inner() -> StoreResult<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope"))?;
            Ok(())
        }
        assert!(matches!(inner(), Err(StoreError::Permission(_))));
    }
}
