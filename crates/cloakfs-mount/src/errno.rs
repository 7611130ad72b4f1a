//! Error-to-errno mapping: the error half of the host adapter contract.
//!
//! Host callbacks return zero-or-positive success or a negative errno; the
//! kernel adapter negates the values returned here.

use std::io;

use cloakfs_core::StoreError;

/// POSIX errno for a backend error.
pub fn errno_for(err: &StoreError) -> i32 {
    match err {
        // An unroutable path looks like a missing one from outside.
        StoreError::NotFound(_) | StoreError::NoBackend(_) => libc::ENOENT,
        StoreError::NotADirectory(_) => libc::ENOTDIR,
        StoreError::IsDirectory(_) => libc::EISDIR,
        StoreError::Exists(_) => libc::EEXIST,
        StoreError::NotEmpty(_) => libc::ENOTEMPTY,
        StoreError::Permission(_) => libc::EACCES,
        StoreError::BadDescriptor(_) => libc::EBADF,
        StoreError::InvalidArgument(_) => libc::EINVAL,
        StoreError::CrossDevice(_) => libc::EXDEV,
        // Undecodable names are only tolerated inside readdir, where the
        // store substitutes the sentinel entry instead of failing.
        StoreError::InvalidName(_) => libc::EIO,
        StoreError::Io(e) => io_error_to_errno(e),
    }
}

/// Raw OS error of an I/O error, or `EIO` when there is none.
pub fn io_error_to_errno(err: &io::Error) -> i32 {
    err.raw_os_error().unwrap_or(libc::EIO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_mapping() {
        let cases: Vec<(StoreError, i32)> = vec![
            (StoreError::NotFound("/a".into()), libc::ENOENT),
            (StoreError::NoBackend("/a".into()), libc::ENOENT),
            (StoreError::NotADirectory("/a".into()), libc::ENOTDIR),
            (StoreError::IsDirectory("/a".into()), libc::EISDIR),
            (StoreError::Exists("/a".into()), libc::EEXIST),
            (StoreError::NotEmpty("/a".into()), libc::ENOTEMPTY),
            (StoreError::Permission("/a".into()), libc::EACCES),
            (StoreError::BadDescriptor(7), libc::EBADF),
            (StoreError::InvalidArgument("size".into()), libc::EINVAL),
            (StoreError::CrossDevice("/a -> /b".into()), libc::EXDEV),
            (StoreError::InvalidName("tok".into()), libc::EIO),
        ];
        for (err, expected) in cases {
            assert_eq!(errno_for(&err), expected, "{err}");
        }
    }

    #[test]
    fn io_errors_pass_their_os_code_through() {
        let err = StoreError::Io(io::Error::from_raw_os_error(libc::ENOSPC));
        assert_eq!(errno_for(&err), libc::ENOSPC);
    }

    #[test]
    fn synthetic_io_errors_become_eio() {
        let err = StoreError::Io(io::Error::other("no os code"));
        assert_eq!(errno_for(&err), libc::EIO);
    }
}
