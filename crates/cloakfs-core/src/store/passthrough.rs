//! Pass-through backend: forwards to a host directory unchanged.
//!
//! No name encryption, no header, no cipher; what goes in is what lands on
//! disk. Used by tests as a known-plaintext fixture and for mounting an
//! unencrypted subtree under a prefix next to an encrypted one.

use std::fs::{self, File, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, FileExt, OpenOptionsExt, PermissionsExt};
use std::path::PathBuf;

use filetime::FileTime;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{
    Attr, Backend, DirEntry, FileKind, FsStats, OpenFlags, SetAttr, backing_fs_stats,
};
use crate::error::{StoreError, StoreResult};
use crate::handles::HandleTable;
use crate::store::encrypted::attr_from_metadata;

#[derive(Debug)]
struct HandleEntry {
    file: Mutex<File>,
    virtual_path: String,
    flags: OpenFlags,
}

/// Unencrypted backend over one backing directory.
pub struct PassthroughStore {
    base: PathBuf,
    handles: HandleTable<HandleEntry>,
}

impl PassthroughStore {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            handles: HandleTable::new(),
        }
    }

    fn real_path(&self, path: &str) -> PathBuf {
        let mut real = self.base.clone();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            real.push(component);
        }
        real
    }
}

impl Backend for PassthroughStore {
    fn init(&self) -> StoreResult<()> {
        let base_display = self.base.display().to_string();
        match fs::metadata(&self.base) {
            Ok(meta) if meta.is_dir() => {
                debug!(base = %base_display, "pass-through store ready");
                Ok(())
            }
            _ => Err(StoreError::NotADirectory(base_display)),
        }
    }

    fn readdir(&self, path: &str) -> StoreResult<Vec<DirEntry>> {
        let real = self.real_path(path);
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&real).map_err(|e| StoreError::from_io(e, path))? {
            let dirent = dirent.map_err(|e| StoreError::from_io(e, path))?;
            let kind = if dirent
                .file_type()
                .map_err(|e| StoreError::from_io(e, path))?
                .is_dir()
            {
                FileKind::Directory
            } else {
                FileKind::File
            };
            entries.push(DirEntry {
                name: dirent.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(entries)
    }

    fn getattr(&self, path: &str) -> StoreResult<Attr> {
        let real = self.real_path(path);
        let meta = fs::metadata(&real).map_err(|e| StoreError::from_io(e, path))?;
        let kind = if meta.is_dir() {
            FileKind::Directory
        } else {
            FileKind::File
        };
        Ok(attr_from_metadata(&meta, kind, meta.len()))
    }

    fn access(&self, path: &str) -> StoreResult<()> {
        fs::metadata(self.real_path(path))
            .map(|_| ())
            .map_err(|e| StoreError::from_io(e, path))
    }

    fn statfs(&self, _path: &str) -> StoreResult<FsStats> {
        backing_fs_stats(&self.base)
    }

    fn open(&self, path: &str, flags: OpenFlags) -> StoreResult<u64> {
        let real = self.real_path(path);
        let mut options = OpenOptions::new();
        options.read(flags.read);
        if flags.write || flags.append {
            options.write(true);
        }
        if flags.create {
            options.create(true);
        }
        if flags.truncate {
            options.truncate(true);
        }
        let file = options.open(&real).map_err(|e| StoreError::from_io(e, path))?;
        let fd = self.handles.alloc(HandleEntry {
            file: Mutex::new(file),
            virtual_path: path.to_string(),
            flags,
        });
        trace!(path, fd, "opened");
        Ok(fd)
    }

    fn create(&self, path: &str, mode: u32) -> StoreResult<u64> {
        let real = self.real_path(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&real)
            .map_err(|e| StoreError::from_io(e, path))?;
        let fd = self.handles.alloc(HandleEntry {
            file: Mutex::new(file),
            virtual_path: path.to_string(),
            flags: OpenFlags::read_write(),
        });
        debug!(path, fd, "created");
        Ok(fd)
    }

    fn read(&self, path: &str, fd: u64, len: usize, offset: u64) -> StoreResult<Vec<u8>> {
        let entry = self.handles.get(fd)?;
        if !entry.flags.read {
            return Err(StoreError::Permission(path.to_string()));
        }
        let file = entry.file.lock();
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        let mut pos = offset;
        while filled < buf.len() {
            match file.read_at(&mut buf[filled..], pos) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    pos += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(StoreError::from_io(e, path)),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn write(&self, path: &str, fd: u64, data: &[u8], offset: u64) -> StoreResult<usize> {
        let entry = self.handles.get(fd)?;
        if !entry.flags.write && !entry.flags.append {
            return Err(StoreError::Permission(path.to_string()));
        }
        let file = entry.file.lock();
        file.write_all_at(data, offset)
            .map_err(|e| StoreError::from_io(e, path))?;
        Ok(data.len())
    }

    fn release(&self, path: &str, fd: u64) -> StoreResult<()> {
        let entry = self.handles.free(fd)?;
        trace!(path, fd, virtual_path = %entry.virtual_path, "released");
        Ok(())
    }

    fn truncate(&self, path: &str, size: u64) -> StoreResult<()> {
        let real = self.real_path(path);
        let file = OpenOptions::new()
            .write(true)
            .open(&real)
            .map_err(|e| StoreError::from_io(e, path))?;
        file.set_len(size).map_err(|e| StoreError::from_io(e, path))
    }

    fn ftruncate(&self, path: &str, fd: u64, size: u64) -> StoreResult<()> {
        let entry = self.handles.get(fd)?;
        let file = entry.file.lock();
        file.set_len(size).map_err(|e| StoreError::from_io(e, path))
    }

    fn setattr(&self, path: &str, attr: &SetAttr) -> StoreResult<()> {
        let real = self.real_path(path);
        if let Some(mode) = attr.mode {
            fs::set_permissions(&real, Permissions::from_mode(mode))
                .map_err(|e| StoreError::from_io(e, path))?;
        }
        if attr.uid.is_some() || attr.gid.is_some() {
            nix::unistd::chown(
                &real,
                attr.uid.map(nix::unistd::Uid::from_raw),
                attr.gid.map(nix::unistd::Gid::from_raw),
            )
            .map_err(|errno| StoreError::Io(io::Error::from_raw_os_error(errno as i32)))?;
        }
        if attr.atime.is_some() || attr.mtime.is_some() {
            let meta = fs::metadata(&real).map_err(|e| StoreError::from_io(e, path))?;
            let atime = attr
                .atime
                .map_or_else(|| FileTime::from_last_access_time(&meta), FileTime::from_system_time);
            let mtime = attr
                .mtime
                .map_or_else(|| FileTime::from_last_modification_time(&meta), FileTime::from_system_time);
            filetime::set_file_times(&real, atime, mtime)
                .map_err(|e| StoreError::from_io(e, path))?;
        }
        if let Some(size) = attr.size {
            self.truncate(path, size)?;
        }
        Ok(())
    }

    fn mkdir(&self, path: &str, mode: u32) -> StoreResult<()> {
        fs::DirBuilder::new()
            .mode(mode)
            .create(self.real_path(path))
            .map_err(|e| StoreError::from_io(e, path))
    }

    fn rmdir(&self, path: &str) -> StoreResult<()> {
        fs::remove_dir(self.real_path(path)).map_err(|e| StoreError::from_io(e, path))
    }

    fn unlink(&self, path: &str) -> StoreResult<()> {
        fs::remove_file(self.real_path(path)).map_err(|e| StoreError::from_io(e, path))
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        fs::rename(self.real_path(from), self.real_path(to))
            .map_err(|e| StoreError::from_io(e, from))
    }
}
