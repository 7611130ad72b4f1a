//! FUSE adapter for cloakfs.
//!
//! Builds a [`CloakFs`] over a configured
//! [`Dispatcher`](cloakfs_mount::Dispatcher) and mounts it with fuser. The
//! session runs single-threaded, so dispatch is serialized exactly as the
//! dispatcher expects.

pub mod filesystem;
pub mod inode;

use std::io;
use std::path::Path;
use std::sync::Arc;

use fuser::MountOption;

use cloakfs_mount::Dispatcher;

pub use filesystem::CloakFs;
pub use inode::{InodeTable, ROOT_INODE};

fn mount_options() -> Vec<MountOption> {
    vec![
        MountOption::FSName("cloakfs".to_string()),
        MountOption::DefaultPermissions,
    ]
}

/// Mount and block until the filesystem is unmounted.
pub fn mount(dispatcher: Arc<Dispatcher>, mountpoint: &Path) -> io::Result<()> {
    fuser::mount2(CloakFs::new(dispatcher), mountpoint, &mount_options())
}

/// Mount on a background session; dropping the returned session unmounts.
pub fn spawn_mount(
    dispatcher: Arc<Dispatcher>,
    mountpoint: &Path,
) -> io::Result<fuser::BackgroundSession> {
    fuser::spawn_mount2(CloakFs::new(dispatcher), mountpoint, &mount_options())
}
