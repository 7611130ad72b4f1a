//! The encrypted store: on-disk format and the random-access cipher path.
//!
//! Backing layout of every regular file:
//!
//! ```text
//! bytes 0..8    plaintext size S, big-endian u64 (authoritative length)
//! bytes 8..24   nonce N, random at first write, immutable thereafter
//! bytes 24..    AES-256-CTR body, counter 0 at the first body byte
//! ```
//!
//! A backing file is either empty (never written) or at least [`META`]
//! bytes. The body is kept a multiple of the AES block; bytes past S inside
//! the final block are residual cipher output and are never surfaced.
//! Within a single write the body is rewritten before the size field, so a
//! crash in between leaves S at the pre-write length and readers clip
//! correctly.
//!
//! Directory entries are stored under their encrypted component names; see
//! [`crate::crypto::names`].

use std::fs::{self, File, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::PathBuf;
use std::time::{Duration, UNIX_EPOCH};

use filetime::FileTime;
use parking_lot::Mutex;
use rand::RngCore;
use tracing::{debug, trace, warn};

use crate::crypto::keys::SecretKey;
use crate::crypto::names::NameCodec;
use crate::crypto::stream::{AES_BLOCK, NONCE_LEN, StreamCipher};
use crate::error::{StoreError, StoreResult};
use crate::handles::HandleTable;
use super::{
    Attr, Backend, DEFAULT_BLOCK_SIZE, DirEntry, FileKind, FsStats, OpenFlags, SetAttr,
    UNDECODABLE_NAME, backing_fs_stats,
};

/// Header length: 8-byte size field plus the 16-byte nonce.
pub const META: u64 = 8 + NONCE_LEN as u64;

const BLOCK: u64 = AES_BLOCK as u64;

/// Parsed file header.
#[derive(Debug, Clone, Copy)]
struct Header {
    size: u64,
    nonce: [u8; NONCE_LEN],
}

/// State of one open descriptor.
#[derive(Debug)]
struct HandleEntry {
    /// Backing file, behind a mutex so operations on one descriptor
    /// serialize. Read-modify-write of a shared block is not atomic at the
    /// backing-store level.
    file: Mutex<File>,
    virtual_path: String,
    real_path: PathBuf,
    flags: OpenFlags,
}

/// Encrypting backend over one backing directory.
pub struct EncryptedStore {
    base: PathBuf,
    names: NameCodec,
    cipher: StreamCipher,
    /// Plaintext block size for the read-modify-write loop.
    block_size: u64,
    handles: HandleTable<HandleEntry>,
}

impl EncryptedStore {
    /// Store with the default 64 KiB plaintext block size.
    pub fn new(base: impl Into<PathBuf>, key: &SecretKey) -> StoreResult<Self> {
        Self::with_block_size(base, key, DEFAULT_BLOCK_SIZE)
    }

    /// Store with an explicit plaintext block size, which must be a nonzero
    /// multiple of the AES block.
    pub fn with_block_size(
        base: impl Into<PathBuf>,
        key: &SecretKey,
        block_size: usize,
    ) -> StoreResult<Self> {
        if block_size == 0 || block_size % AES_BLOCK != 0 {
            return Err(StoreError::InvalidArgument(format!(
                "block size {block_size} is not a multiple of {AES_BLOCK}"
            )));
        }
        Ok(Self {
            base: base.into(),
            names: NameCodec::new(key),
            cipher: StreamCipher::new(key),
            block_size: block_size as u64,
            handles: HandleTable::new(),
        })
    }

    /// Map a mount-relative path onto the backing tree by encrypting each
    /// component.
    fn real_path(&self, path: &str) -> StoreResult<PathBuf> {
        let mut real = self.base.clone();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            real.push(self.names.encrypt(component)?);
        }
        Ok(real)
    }

    /// Read the header if the file has one. Files shorter than [`META`]
    /// have never been written and report no header.
    fn read_header(file: &File) -> io::Result<Option<Header>> {
        let mut raw = [0u8; META as usize];
        if read_full_at(file, &mut raw, 0)? < raw.len() {
            return Ok(None);
        }
        let mut size = [0u8; 8];
        size.copy_from_slice(&raw[..8]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&raw[8..]);
        Ok(Some(Header {
            size: u64::from_be_bytes(size),
            nonce,
        }))
    }

    /// Header for a write path: parse it, or lazily initialize one with a
    /// fresh random nonce when the file has never been written.
    fn ensure_header(file: &File, path: &str) -> StoreResult<Header> {
        if let Some(header) = Self::read_header(file)? {
            return Ok(header);
        }
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let header = Header { size: 0, nonce };
        write_header(file, &header)?;
        trace!(path, "initialized file header");
        Ok(header)
    }

    /// The read/modify/write loop shared by `write`.
    ///
    /// Covers the plaintext interval `[start, end)` where `start` is pulled
    /// back to the old S when the write begins beyond it, so the gap region
    /// lands on disk as enciphered zeros and later reads of it return
    /// zeros.
    fn write_blocks(
        &self,
        file: &File,
        header: &Header,
        data: &[u8],
        offset: u64,
        old_size: u64,
    ) -> StoreResult<()> {
        let end = offset + data.len() as u64;
        let mut pos = if offset > old_size { old_size } else { offset };

        while pos < end {
            let block_start = (pos / self.block_size) * self.block_size;
            let block_end = (block_start + self.block_size).min(end);
            let span = block_end - block_start;

            // Existing ciphertext worth reading back: through the span we
            // rewrite, but never past the old S.
            let existing = old_size.saturating_sub(block_start).min(self.block_size);
            let read_len = round_up(existing).min(round_up(span)) as usize;
            let mut buf = vec![0u8; round_up(span) as usize];

            let counter = block_start / BLOCK;
            if read_len > 0 {
                let got = read_full_at(file, &mut buf[..read_len], META + block_start)?;
                self.cipher.apply(&header.nonce, counter, &mut buf[..got]);
            }

            // Plaintext between the old S and the write offset reads back
            // as residue; it must land as zeros.
            if offset > old_size {
                let zero_from = old_size.max(block_start) - block_start;
                let zero_to = offset.min(block_end) - block_start;
                if zero_from < zero_to {
                    buf[zero_from as usize..zero_to as usize].fill(0);
                }
            }

            if block_end > offset {
                let dst_from = (offset.max(block_start) - block_start) as usize;
                let dst_to = span as usize;
                let src_from = (offset.max(block_start) - offset) as usize;
                buf[dst_from..dst_to]
                    .copy_from_slice(&data[src_from..src_from + (dst_to - dst_from)]);
            }

            // Same counter as the original contents, so untouched bytes in
            // the rounded tail re-encipher to their previous ciphertext.
            self.cipher.apply(&header.nonce, counter, &mut buf);
            file.write_all_at(&buf, META + block_start)?;

            pos = block_end;
        }
        Ok(())
    }

    fn truncate_file(&self, file: &File, path: &str, size: u64) -> StoreResult<()> {
        Self::ensure_header(file, path)?;
        write_size(file, size)?;

        let body_len = round_up(size);
        let physical = file.metadata()?.len();
        if physical > META + body_len {
            file.set_len(META + body_len)?;
        }
        debug!(path, size, "truncated");
        Ok(())
    }
}

impl Backend for EncryptedStore {
    fn init(&self) -> StoreResult<()> {
        // Missing and non-directory both refuse registration the same way.
        let base_display = self.base.display().to_string();
        match fs::metadata(&self.base) {
            Ok(meta) if meta.is_dir() => {
                debug!(base = %base_display, block_size = self.block_size, "encrypted store ready");
                Ok(())
            }
            _ => Err(StoreError::NotADirectory(base_display)),
        }
    }

    fn readdir(&self, path: &str) -> StoreResult<Vec<DirEntry>> {
        let real = self.real_path(path)?;
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&real).map_err(|e| StoreError::from_io(e, path))? {
            let dirent = dirent.map_err(|e| StoreError::from_io(e, path))?;
            let token = dirent.file_name().to_string_lossy().into_owned();
            let name = match self.names.decrypt(&token) {
                Ok(name) => name,
                Err(_) => {
                    warn!(path, token = %token, "undecodable entry in backing directory");
                    UNDECODABLE_NAME.to_string()
                }
            };
            let kind = if dirent
                .file_type()
                .map_err(|e| StoreError::from_io(e, path))?
                .is_dir()
            {
                FileKind::Directory
            } else {
                FileKind::File
            };
            entries.push(DirEntry { name, kind });
        }
        // Host order; callers rely on it being unsorted.
        Ok(entries)
    }

    fn getattr(&self, path: &str) -> StoreResult<Attr> {
        let real = self.real_path(path)?;
        let meta = fs::metadata(&real).map_err(|e| StoreError::from_io(e, path))?;
        if meta.is_dir() {
            return Ok(attr_from_metadata(&meta, FileKind::Directory, meta.len()));
        }
        // The logical length lives in the header, not in the backing size.
        let file = File::open(&real).map_err(|e| StoreError::from_io(e, path))?;
        let size = Self::read_header(&file)?.map_or(0, |h| h.size);
        Ok(attr_from_metadata(&meta, FileKind::File, size))
    }

    fn access(&self, path: &str) -> StoreResult<()> {
        let real = self.real_path(path)?;
        fs::metadata(&real)
            .map(|_| ())
            .map_err(|e| StoreError::from_io(e, path))
    }

    fn statfs(&self, _path: &str) -> StoreResult<FsStats> {
        backing_fs_stats(&self.base)
    }

    fn open(&self, path: &str, flags: OpenFlags) -> StoreResult<u64> {
        let real = self.real_path(path)?;
        let mut options = OpenOptions::new();
        // Header reads need read access even on write-only opens. O_APPEND
        // is deliberately not forwarded: positioned writes must land at the
        // offsets the host supplies.
        options.read(true);
        if flags.write || flags.append || flags.truncate {
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
            real_path: real,
            flags,
        });
        trace!(path, fd, "opened");
        Ok(fd)
    }

    fn create(&self, path: &str, mode: u32) -> StoreResult<u64> {
        let real = self.real_path(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&real)
            .map_err(|e| StoreError::from_io(e, path))?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        write_header(&file, &Header { size: 0, nonce })?;

        let fd = self.handles.alloc(HandleEntry {
            file: Mutex::new(file),
            virtual_path: path.to_string(),
            real_path: real,
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

        let Some(header) = Self::read_header(&file)? else {
            return Ok(Vec::new());
        };
        if offset >= header.size {
            return Ok(Vec::new());
        }
        let end = header.size.min(offset + len as u64);
        let mut out = vec![0u8; (end - offset) as usize];

        let mut pos = offset;
        while pos < end {
            let block_start = (pos / self.block_size) * self.block_size;
            let block_end = (block_start + self.block_size).min(end);
            let span = block_end - block_start;

            let cipher_len = round_up(span).min(round_up(header.size - block_start)) as usize;
            let mut ciphertext = vec![0u8; cipher_len];
            let got = read_full_at(&file, &mut ciphertext, META + block_start)?;
            // Bytes past the physical end stay zero in the output; only
            // what was actually read gets deciphered.
            self.cipher
                .apply(&header.nonce, block_start / BLOCK, &mut ciphertext[..got]);

            let src_from = (pos - block_start) as usize;
            let src_to = span as usize;
            let dst_from = (pos - offset) as usize;
            out[dst_from..dst_from + (src_to - src_from)]
                .copy_from_slice(&ciphertext[src_from..src_to]);

            pos = block_end;
        }
        Ok(out)
    }

    fn write(&self, path: &str, fd: u64, data: &[u8], offset: u64) -> StoreResult<usize> {
        let entry = self.handles.get(fd)?;
        if !entry.flags.write && !entry.flags.append {
            return Err(StoreError::Permission(path.to_string()));
        }
        if data.is_empty() {
            return Ok(0);
        }
        let file = entry.file.lock();

        let header = Self::ensure_header(&file, path)?;
        let old_size = header.size;
        let new_size = old_size.max(offset + data.len() as u64);

        self.write_blocks(&file, &header, data, offset, old_size)?;
        // Size field last: a crash mid-write leaves S at the old length and
        // the extra body bytes unreachable.
        if new_size != old_size {
            write_size(&file, new_size)?;
        }
        Ok(data.len())
    }

    fn release(&self, path: &str, fd: u64) -> StoreResult<()> {
        let entry = self.handles.free(fd)?;
        trace!(
            path,
            fd,
            virtual_path = %entry.virtual_path,
            real_path = %entry.real_path.display(),
            "released"
        );
        Ok(())
    }

    fn truncate(&self, path: &str, size: u64) -> StoreResult<()> {
        let real = self.real_path(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&real)
            .map_err(|e| StoreError::from_io(e, path))?;
        self.truncate_file(&file, path, size)
    }

    fn ftruncate(&self, path: &str, fd: u64, size: u64) -> StoreResult<()> {
        let entry = self.handles.get(fd)?;
        let file = entry.file.lock();
        self.truncate_file(&file, path, size)
    }

    fn setattr(&self, path: &str, attr: &SetAttr) -> StoreResult<()> {
        let real = self.real_path(path)?;
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
        let real = self.real_path(path)?;
        fs::DirBuilder::new()
            .mode(mode)
            .create(&real)
            .map_err(|e| StoreError::from_io(e, path))?;
        debug!(path, "mkdir");
        Ok(())
    }

    fn rmdir(&self, path: &str) -> StoreResult<()> {
        let real = self.real_path(path)?;
        fs::remove_dir(&real).map_err(|e| StoreError::from_io(e, path))
    }

    fn unlink(&self, path: &str) -> StoreResult<()> {
        let real = self.real_path(path)?;
        fs::remove_file(&real).map_err(|e| StoreError::from_io(e, path))
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let real_from = self.real_path(from)?;
        let real_to = self.real_path(to)?;
        fs::rename(&real_from, &real_to).map_err(|e| StoreError::from_io(e, from))
    }
}

/// Attributes from backing metadata with the logical size substituted.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub(crate) fn attr_from_metadata(meta: &fs::Metadata, kind: FileKind, size: u64) -> Attr {
    let ctime_secs = meta.ctime();
    let ctime = if ctime_secs >= 0 {
        UNIX_EPOCH + Duration::new(ctime_secs as u64, meta.ctime_nsec() as u32)
    } else {
        UNIX_EPOCH
    };
    Attr {
        size,
        kind,
        perm: meta.permissions().mode() & 0o7777,
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        atime: meta.accessed().unwrap_or(UNIX_EPOCH),
        mtime: meta.modified().unwrap_or(UNIX_EPOCH),
        ctime,
    }
}

fn round_up(n: u64) -> u64 {
    n.div_ceil(BLOCK) * BLOCK
}

/// Positioned read that keeps going across short reads; returns how many
/// bytes were filled. A tail left unfilled means end of file.
fn read_full_at(file: &File, buf: &mut [u8], mut offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn write_header(file: &File, header: &Header) -> io::Result<()> {
    let mut raw = [0u8; META as usize];
    raw[..8].copy_from_slice(&header.size.to_be_bytes());
    raw[8..].copy_from_slice(&header.nonce);
    file.write_all_at(&raw, 0)
}

fn write_size(file: &File, size: u64) -> io::Result<()> {
    file.write_all_at(&size.to_be_bytes(), 0)
}
