//! The VFS dispatcher: longest-prefix routing across registered backends.
//!
//! Every operation the kernel adapter exposes funnels through here. The
//! dispatcher picks the backend whose registered prefix is the longest match
//! for the incoming path, hands it the remainder of the path, measures
//! read/write latency into the per-descriptor [`StatsTable`], and logs
//! failures at the error boundary so the adapter only ever sees the error
//! taxonomy.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, error, info};

use cloakfs_core::store::{Attr, DirEntry, FsStats, OpenFlags, SetAttr};
use cloakfs_core::{Backend, StoreError, StoreResult};

use crate::stats::StatsTable;

struct Registration {
    prefix: String,
    backend: Arc<dyn Backend>,
}

/// Routes path-addressed operations to registered backends.
pub struct Dispatcher {
    /// Registrations ordered by descending prefix length; the first match
    /// wins during resolution.
    registry: RwLock<Vec<Registration>>,
    stats: StatsTable,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Vec::new()),
            stats: StatsTable::new(),
        }
    }

    /// Register `backend` under `prefix`, anchored at the mount root.
    ///
    /// Runs the backend's `init`, which fails with
    /// [`StoreError::NotADirectory`] when the backing directory is absent.
    pub fn register(&self, prefix: &str, backend: Arc<dyn Backend>) -> StoreResult<()> {
        if !prefix.starts_with('/') {
            return Err(StoreError::InvalidArgument(format!(
                "prefix {prefix:?} is not anchored at the mount root"
            )));
        }
        let prefix = normalize_prefix(prefix);
        backend.init()?;

        let mut registry = self.registry.write();
        if registry.iter().any(|r| r.prefix == prefix) {
            return Err(StoreError::Exists(prefix));
        }
        info!(prefix = %prefix, "backend registered");
        registry.push(Registration { prefix, backend });
        registry.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(())
    }

    /// Per-descriptor statistics (created on open, dropped on release).
    #[must_use]
    pub fn stats(&self) -> &StatsTable {
        &self.stats
    }

    /// Longest-prefix resolution: the backend plus the backend-relative
    /// remainder of `path`.
    fn resolve(&self, path: &str) -> StoreResult<(Arc<dyn Backend>, String)> {
        let registry = self.registry.read();
        for registration in registry.iter() {
            if let Some(rest) = match_prefix(&registration.prefix, path) {
                return Ok((Arc::clone(&registration.backend), rest));
            }
        }
        Err(StoreError::NoBackend(path.to_string()))
    }

    fn checked<T>(&self, op: &'static str, path: &str, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(ref err) = result {
            error!(op, path, error = %err, "backend operation failed");
        }
        result
    }

    pub fn readdir(&self, path: &str) -> StoreResult<Vec<DirEntry>> {
        debug!(path, "readdir");
        let (backend, rest) = self.resolve(path)?;
        self.checked("readdir", path, backend.readdir(&rest))
    }

    pub fn getattr(&self, path: &str) -> StoreResult<Attr> {
        debug!(path, "getattr");
        let (backend, rest) = self.resolve(path)?;
        self.checked("getattr", path, backend.getattr(&rest))
    }

    pub fn access(&self, path: &str) -> StoreResult<()> {
        debug!(path, "access");
        let (backend, rest) = self.resolve(path)?;
        self.checked("access", path, backend.access(&rest))
    }

    pub fn statfs(&self, path: &str) -> StoreResult<FsStats> {
        debug!(path, "statfs");
        let (backend, rest) = self.resolve(path)?;
        self.checked("statfs", path, backend.statfs(&rest))
    }

    pub fn open(&self, path: &str, flags: OpenFlags) -> StoreResult<u64> {
        debug!(path, ?flags, "open");
        let (backend, rest) = self.resolve(path)?;
        let fd = self.checked("open", path, backend.open(&rest, flags))?;
        self.stats.open(fd, path);
        Ok(fd)
    }

    pub fn create(&self, path: &str, mode: u32) -> StoreResult<u64> {
        debug!(path, mode, "create");
        let (backend, rest) = self.resolve(path)?;
        let fd = self.checked("create", path, backend.create(&rest, mode))?;
        self.stats.open(fd, path);
        Ok(fd)
    }

    pub fn read(&self, path: &str, fd: u64, len: u32, offset: i64) -> StoreResult<Vec<u8>> {
        debug!(path, fd, len, offset, "read");
        let offset = positive(offset, "read offset")?;
        let (backend, rest) = self.resolve(path)?;

        let started = Instant::now();
        let data = self.checked("read", path, backend.read(&rest, fd, len as usize, offset))?;
        self.stats
            .record_read(fd, data.len() as u64, started.elapsed());
        Ok(data)
    }

    pub fn write(&self, path: &str, fd: u64, data: &[u8], offset: i64) -> StoreResult<usize> {
        debug!(path, fd, len = data.len(), offset, "write");
        let offset = positive(offset, "write offset")?;
        let (backend, rest) = self.resolve(path)?;

        let started = Instant::now();
        let written = self.checked("write", path, backend.write(&rest, fd, data, offset))?;
        self.stats
            .record_write(fd, written as u64, started.elapsed());
        Ok(written)
    }

    pub fn release(&self, path: &str, fd: u64) -> StoreResult<()> {
        debug!(path, fd, "release");
        let (backend, rest) = self.resolve(path)?;
        let result = self.checked("release", path, backend.release(&rest, fd));
        // The record goes away even if the backend balked; the descriptor
        // is gone from the host's point of view either way.
        self.stats.release(fd);
        result
    }

    pub fn truncate(&self, path: &str, size: i64) -> StoreResult<()> {
        debug!(path, size, "truncate");
        let size = positive(size, "truncate size")?;
        let (backend, rest) = self.resolve(path)?;
        self.checked("truncate", path, backend.truncate(&rest, size))
    }

    pub fn ftruncate(&self, path: &str, fd: u64, size: i64) -> StoreResult<()> {
        debug!(path, fd, size, "ftruncate");
        let size = positive(size, "ftruncate size")?;
        let (backend, rest) = self.resolve(path)?;
        self.checked("ftruncate", path, backend.ftruncate(&rest, fd, size))
    }

    pub fn setattr(&self, path: &str, attr: &SetAttr) -> StoreResult<()> {
        debug!(path, ?attr, "setattr");
        let (backend, rest) = self.resolve(path)?;
        self.checked("setattr", path, backend.setattr(&rest, attr))
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> StoreResult<()> {
        debug!(path, mode, "mkdir");
        let (backend, rest) = self.resolve(path)?;
        self.checked("mkdir", path, backend.mkdir(&rest, mode))
    }

    pub fn rmdir(&self, path: &str) -> StoreResult<()> {
        debug!(path, "rmdir");
        let (backend, rest) = self.resolve(path)?;
        self.checked("rmdir", path, backend.rmdir(&rest))
    }

    pub fn unlink(&self, path: &str) -> StoreResult<()> {
        debug!(path, "unlink");
        let (backend, rest) = self.resolve(path)?;
        self.checked("unlink", path, backend.unlink(&rest))
    }

    /// Rename, always executed by the source backend.
    ///
    /// The destination is rebased into its own backend's namespace when its
    /// prefix matches one, and passed through verbatim otherwise. A
    /// destination owned by a different backend is refused with
    /// [`StoreError::CrossDevice`] before anything touches disk.
    pub fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        debug!(from, to, "rename");
        let (backend, from_rest) = self.resolve(from)?;

        let to_rest = match self.resolve(to) {
            Ok((to_backend, rest)) => {
                if !Arc::ptr_eq(&backend, &to_backend) {
                    let err = StoreError::CrossDevice(format!("{from} -> {to}"));
                    error!(from, to, error = %err, "rename spans backends");
                    return Err(err);
                }
                rest
            }
            Err(StoreError::NoBackend(_)) => to.to_string(),
            Err(other) => return Err(other),
        };
        self.checked("rename", from, backend.rename(&from_rest, &to_rest))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Trim trailing separators; the root prefix stays `/`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Backend-relative remainder of `path` if `prefix` matches.
///
/// The remainder keeps a leading `/`; stripping an exact match yields `/`.
fn match_prefix(prefix: &str, path: &str) -> Option<String> {
    if prefix == "/" {
        return Some(if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        });
    }
    if path == prefix {
        return Some("/".to_string());
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

fn positive(value: i64, what: &str) -> StoreResult<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::InvalidArgument(format!("negative {what}: {value}")))
}
