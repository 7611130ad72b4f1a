//! Mount-side plumbing for cloakfs.
//!
//! The kernel adapter talks to exactly three things here:
//!
//! - [`Dispatcher`] — routes each path-addressed operation to the backend
//!   registered under the longest matching prefix
//! - [`stats`] — per-descriptor latency and throughput accounting
//! - [`errno`] — the mapping from [`StoreError`](cloakfs_core::StoreError)
//!   to the negative-errno convention host callbacks expect

pub mod dispatcher;
pub mod errno;
pub mod stats;

pub use dispatcher::Dispatcher;
pub use errno::{errno_for, io_error_to_errno};
pub use stats::{HandleStats, StatsTable};
