//! The fuser `Filesystem` implementation.
//!
//! A thin translation layer: inode-addressed kernel calls become the
//! dispatcher's path-addressed operations via the [`InodeTable`], and
//! backend errors become negative errnos via the mount-side mapping. All
//! routing, statistics, and cipher work happens below the dispatcher; this
//! file only shuttles arguments and replies.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use tracing::trace;

use cloakfs_core::store::{Attr, FileKind, OpenFlags, SetAttr};
use cloakfs_mount::{Dispatcher, errno_for};

use crate::inode::{InodeTable, ROOT_INODE};

/// TTL the kernel may cache attributes and entries for.
const ATTR_TTL: Duration = Duration::from_secs(1);

/// Block size reported in attributes.
const BLOCK_SIZE: u32 = 4096;

/// FUSE filesystem over a cloakfs dispatcher.
pub struct CloakFs {
    dispatcher: Arc<Dispatcher>,
    inodes: InodeTable,
}

impl CloakFs {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            inodes: InodeTable::new(),
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, i32> {
        self.inodes.path_of(ino).ok_or(libc::ENOENT)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, i32> {
        let parent_path = self.path_of(parent)?;
        let name = name.to_str().ok_or(libc::EINVAL)?;
        if name.is_empty() || name.contains('/') {
            return Err(libc::EINVAL);
        }
        Ok(join_path(&parent_path, name))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn fuse_attr(ino: u64, attr: &Attr) -> FileAttr {
        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(512),
            atime: attr.atime,
            mtime: attr.mtime,
            ctime: attr.ctime,
            crtime: attr.mtime,
            kind: match attr.kind {
                FileKind::Directory => FileType::Directory,
                FileKind::File => FileType::RegularFile,
            },
            perm: attr.perm as u16,
            nlink: attr.nlink.max(1),
            uid: attr.uid,
            gid: attr.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// getattr through the dispatcher, shaped for a fuser reply.
    fn stat(&self, path: &str, ino: u64) -> Result<FileAttr, i32> {
        match self.dispatcher.getattr(path) {
            Ok(attr) => Ok(Self::fuse_attr(ino, &attr)),
            Err(err) => Err(errno_for(&err)),
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn time_or_now(t: TimeOrNow) -> SystemTime {
    match t {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    }
}

impl Filesystem for CloakFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        trace!(path, "lookup");
        let ino = self.inodes.get_or_assign(&path);
        match self.stat(&path, ino) {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.stat(&path, ino) {
            Ok(attr) => reply.attr(&ATTR_TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        if let Some(size) = size {
            let Ok(size) = i64::try_from(size) else {
                return reply.error(libc::EINVAL);
            };
            let result = match fh {
                Some(fh) => self.dispatcher.ftruncate(&path, fh, size),
                None => self.dispatcher.truncate(&path, size),
            };
            if let Err(err) = result {
                return reply.error(errno_for(&err));
            }
        }

        let changes = SetAttr {
            mode,
            uid,
            gid,
            size: None, // handled above through truncate/ftruncate
            atime: atime.map(time_or_now),
            mtime: mtime.map(time_or_now),
        };
        if changes.mode.is_some()
            || changes.uid.is_some()
            || changes.gid.is_some()
            || changes.atime.is_some()
            || changes.mtime.is_some()
        {
            if let Err(err) = self.dispatcher.setattr(&path, &changes) {
                return reply.error(errno_for(&err));
            }
        }

        match self.stat(&path, ino) {
            Ok(attr) => reply.attr(&ATTR_TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        // ENOSYS makes the kernel fall back to create() for regular files.
        reply.error(libc::ENOSYS);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        if let Err(err) = self.dispatcher.mkdir(&path, mode & !umask) {
            return reply.error(errno_for(&err));
        }
        let ino = self.inodes.get_or_assign(&path);
        match self.stat(&path, ino) {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.dispatcher.unlink(&path) {
            Ok(()) => {
                self.inodes.remove_path(&path);
                reply.ok();
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.dispatcher.rmdir(&path) {
            Ok(()) => {
                self.inodes.remove_path(&path);
                reply.ok();
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let from = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let to = match self.child_path(newparent, newname) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.dispatcher.rename(&from, &to) {
            Ok(()) => {
                self.inodes.rename(&from, &to);
                reply.ok();
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.dispatcher.open(&path, OpenFlags::from_raw(flags)) {
            Ok(fd) => reply.opened(fd, 0),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let fd = match self.dispatcher.create(&path, mode & !umask) {
            Ok(fd) => fd,
            Err(err) => return reply.error(errno_for(&err)),
        };
        let ino = self.inodes.get_or_assign(&path);
        match self.stat(&path, ino) {
            Ok(attr) => reply.created(&ATTR_TTL, &attr, 0, fd, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.dispatcher.read(&path, fh, size, offset) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.dispatcher.write(&path, fh, data, offset) {
            #[allow(clippy::cast_possible_truncation)]
            Ok(written) => reply.written(written as u32),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // Writes go straight through the store; nothing is buffered here.
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.dispatcher.release(&path, fh) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.dispatcher.getattr(&path) {
            Ok(attr) if attr.kind == FileKind::Directory => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let entries = match self.dispatcher.readdir(&path) {
            Ok(entries) => entries,
            Err(err) => return reply.error(errno_for(&err)),
        };

        let parent_ino = if ino == ROOT_INODE {
            ROOT_INODE
        } else {
            let parent_path = match path.rfind('/') {
                Some(0) | None => "/".to_string(),
                Some(cut) => path[..cut].to_string(),
            };
            self.inodes.get_or_assign(&parent_path)
        };

        let mut listing: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for entry in entries {
            let child = join_path(&path, &entry.name);
            let kind = match entry.kind {
                FileKind::Directory => FileType::Directory,
                FileKind::File => FileType::RegularFile,
            };
            listing.push((self.inodes.get_or_assign(&child), kind, entry.name));
        }

        #[allow(clippy::cast_sign_loss)]
        for (index, (entry_ino, kind, name)) in
            listing.iter().enumerate().skip(offset as usize)
        {
            // The kernel re-enters with the offset of the next entry.
            if reply.add(*entry_ino, (index + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let path = self.path_of(ino).unwrap_or_else(|_| "/".to_string());
        match self.dispatcher.statfs(&path) {
            Ok(stats) => reply.statfs(
                stats.blocks,
                stats.blocks_free,
                stats.blocks_available,
                stats.files,
                stats.files_free,
                stats.block_size,
                stats.name_max,
                stats.fragment_size,
            ),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, _mask: i32, reply: ReplyEmpty) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.dispatcher.access(&path) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno_for(&err)),
        }
    }
}
