//! Per-descriptor statistics.
//!
//! One record per live descriptor, created on open/create and dropped on
//! release. The dispatcher measures monotonic wall time around each backend
//! read and write and feeds the record; mutation goes through the map entry,
//! so updates for one descriptor never interleave.

use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

/// Accounting for one open descriptor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HandleStats {
    /// Mount path the descriptor was opened under.
    pub path: String,
    pub read_ops: u64,
    pub write_ops: u64,
    pub last_read_bytes: u64,
    pub last_write_bytes: u64,
    pub read_bytes_total: u64,
    pub write_bytes_total: u64,
    pub last_read_time: Duration,
    pub last_write_time: Duration,
    pub read_time_total: Duration,
    pub write_time_total: Duration,
}

impl HandleStats {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Self::default()
        }
    }

    fn record_read(&mut self, bytes: u64, elapsed: Duration) {
        self.read_ops += 1;
        self.last_read_bytes = bytes;
        self.read_bytes_total += bytes;
        self.last_read_time = elapsed;
        self.read_time_total += elapsed;
    }

    fn record_write(&mut self, bytes: u64, elapsed: Duration) {
        self.write_ops += 1;
        self.last_write_bytes = bytes;
        self.write_bytes_total += bytes;
        self.last_write_time = elapsed;
        self.write_time_total += elapsed;
    }
}

/// Statistics records for all live descriptors, keyed by descriptor.
#[derive(Debug, Default)]
pub struct StatsTable {
    records: DashMap<u64, HandleStats>,
}

impl StatsTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly opened descriptor.
    pub fn open(&self, fd: u64, path: &str) {
        self.records.insert(fd, HandleStats::new(path));
    }

    pub fn record_read(&self, fd: u64, bytes: u64, elapsed: Duration) {
        if let Some(mut record) = self.records.get_mut(&fd) {
            record.record_read(bytes, elapsed);
        }
    }

    pub fn record_write(&self, fd: u64, bytes: u64, elapsed: Duration) {
        if let Some(mut record) = self.records.get_mut(&fd) {
            record.record_write(bytes, elapsed);
        }
    }

    /// Stop tracking a released descriptor.
    pub fn release(&self, fd: u64) {
        self.records.remove(&fd);
    }

    /// Snapshot of one descriptor's record.
    #[must_use]
    pub fn get(&self, fd: u64) -> Option<HandleStats> {
        self.records.get(&fd).map(|r| r.clone())
    }

    /// Number of descriptors currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
