//! Storage backends.
//!
//! A [`Backend`] serves one registered mount prefix. Two implementations
//! ship here: [`encrypted::EncryptedStore`], which defines the on-disk
//! cipher format, and [`passthrough::PassthroughStore`], which forwards to a
//! host directory unchanged (for tests, and for mounting plain subtrees next
//! to encrypted ones).
//!
//! All paths handed to a backend are mount-relative, start with `/`, and use
//! `/` separators regardless of host convention.

pub mod encrypted;
pub mod passthrough;

use std::io;
use std::path::Path;
use std::time::SystemTime;

use nix::fcntl::OFlag;

use crate::error::{StoreError, StoreResult};

/// Default plaintext block size for the random-access cipher path (64 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Sentinel readdir name for backing entries whose token does not decode.
pub const UNDECODABLE_NAME: &str = "???";

/// What a directory entry or attribute refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// File attributes as reported to the host.
#[derive(Debug, Clone, Copy)]
pub struct Attr {
    /// Logical size: plaintext length for files, native size for
    /// directories.
    pub size: u64,
    pub kind: FileKind,
    /// Permission bits of the backing inode.
    pub perm: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

/// One readdir entry, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

/// Decoded host open flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
}

impl OpenFlags {
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Self::default()
        }
    }

    /// Decode raw `open(2)` flag bits as the kernel adapter receives them.
    #[must_use]
    pub fn from_raw(raw: i32) -> Self {
        let flags = OFlag::from_bits_truncate(raw);
        let accmode = flags & OFlag::O_ACCMODE;
        Self {
            read: accmode == OFlag::O_RDONLY || accmode == OFlag::O_RDWR,
            write: accmode == OFlag::O_WRONLY || accmode == OFlag::O_RDWR,
            append: flags.contains(OFlag::O_APPEND),
            truncate: flags.contains(OFlag::O_TRUNC),
            create: flags.contains(OFlag::O_CREAT),
        }
    }
}

/// Attribute changes requested by the host. `None` fields are untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
}

/// Filesystem statistics, in `statvfs` terms.
#[derive(Debug, Clone, Copy)]
pub struct FsStats {
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub block_size: u32,
    pub fragment_size: u32,
    pub name_max: u32,
}

/// The operation contract every registered backend implements.
///
/// Descriptors returned by `open`/`create` come from the backend's own
/// [`HandleTable`](crate::handles::HandleTable); operations taking an `fd`
/// fail with [`StoreError::BadDescriptor`] once it has been released.
/// Operations on the same descriptor are serialized by the backend; distinct
/// descriptors may proceed in parallel.
pub trait Backend: Send + Sync {
    /// Called once at registration. Must verify the backing directory
    /// exists and fail with [`StoreError::NotADirectory`] otherwise.
    fn init(&self) -> StoreResult<()>;

    /// List a directory, entries in host order.
    fn readdir(&self, path: &str) -> StoreResult<Vec<DirEntry>>;

    fn getattr(&self, path: &str) -> StoreResult<Attr>;

    fn access(&self, path: &str) -> StoreResult<()>;

    /// Statistics of the backing filesystem.
    fn statfs(&self, path: &str) -> StoreResult<FsStats>;

    fn open(&self, path: &str, flags: OpenFlags) -> StoreResult<u64>;

    /// Create (or truncate) a file and open it read-write.
    fn create(&self, path: &str, mode: u32) -> StoreResult<u64>;

    /// Read at most `len` bytes at `offset`. Short or empty results signal
    /// end of file, not an error.
    fn read(&self, path: &str, fd: u64, len: usize, offset: u64) -> StoreResult<Vec<u8>>;

    /// Write all of `data` at `offset`, returning the byte count accepted.
    fn write(&self, path: &str, fd: u64, data: &[u8], offset: u64) -> StoreResult<usize>;

    /// Release the descriptor. Terminal: any further use of `fd` fails.
    fn release(&self, path: &str, fd: u64) -> StoreResult<()>;

    fn truncate(&self, path: &str, size: u64) -> StoreResult<()>;

    fn ftruncate(&self, path: &str, fd: u64, size: u64) -> StoreResult<()>;

    fn setattr(&self, path: &str, attr: &SetAttr) -> StoreResult<()>;

    fn mkdir(&self, path: &str, mode: u32) -> StoreResult<()>;

    /// Remove an empty directory; fails with [`StoreError::NotEmpty`]
    /// otherwise.
    fn rmdir(&self, path: &str) -> StoreResult<()>;

    fn unlink(&self, path: &str) -> StoreResult<()>;

    /// Rename within this backend's namespace.
    fn rename(&self, from: &str, to: &str) -> StoreResult<()>;
}

/// `statvfs` of the backing tree, converted to [`FsStats`].
#[allow(clippy::cast_possible_truncation, clippy::unnecessary_cast)]
pub(crate) fn backing_fs_stats(path: &Path) -> StoreResult<FsStats> {
    let vfs = nix::sys::statvfs::statvfs(path)
        .map_err(|errno| StoreError::Io(io::Error::from_raw_os_error(errno as i32)))?;
    Ok(FsStats {
        blocks: vfs.blocks() as u64,
        blocks_free: vfs.blocks_free() as u64,
        blocks_available: vfs.blocks_available() as u64,
        files: vfs.files() as u64,
        files_free: vfs.files_free() as u64,
        block_size: vfs.block_size() as u32,
        fragment_size: vfs.fragment_size() as u32,
        name_max: vfs.name_max() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_flags_from_raw() {
        let rdonly = OpenFlags::from_raw(libc_bits(OFlag::O_RDONLY));
        assert!(rdonly.read && !rdonly.write);

        let wronly = OpenFlags::from_raw(libc_bits(OFlag::O_WRONLY));
        assert!(!wronly.read && wronly.write);

        let rdwr_creat = OpenFlags::from_raw(libc_bits(
            OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_TRUNC,
        ));
        assert!(rdwr_creat.read && rdwr_creat.write);
        assert!(rdwr_creat.create && rdwr_creat.truncate);
        assert!(!rdwr_creat.append);
    }

    fn libc_bits(flags: OFlag) -> i32 {
        flags.bits()
    }

    #[test]
    fn backing_fs_stats_of_tmp() {
        let stats = backing_fs_stats(Path::new("/tmp")).unwrap();
        assert!(stats.block_size > 0);
    }
}
