//! Mount command: assemble the dispatcher and hand it to the FUSE adapter.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::info;

use cloakfs_core::SecretKey;
use cloakfs_core::store::DEFAULT_BLOCK_SIZE;
use cloakfs_core::store::encrypted::EncryptedStore;
use cloakfs_core::store::passthrough::PassthroughStore;
use cloakfs_mount::Dispatcher;

#[derive(ClapArgs)]
pub struct Args {
    /// Backing directory holding the encrypted tree
    pub storage: PathBuf,

    /// Where to mount the decrypted view
    pub mountpoint: PathBuf,

    /// Mount key as hex (64 hex digits for the 256-bit key)
    pub key: String,

    /// Plaintext block size of the cipher path, in bytes
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Mount an additional unencrypted subtree: PREFIX=DIR
    #[arg(long = "passthrough", value_name = "PREFIX=DIR")]
    pub passthrough: Vec<String>,
}

pub fn run(args: &Args) -> Result<()> {
    let key = SecretKey::from_hex(&args.key).context("invalid mount key")?;

    let dispatcher = Arc::new(Dispatcher::new());
    let store = EncryptedStore::with_block_size(&args.storage, &key, args.block_size)
        .context("encrypted store configuration")?;
    dispatcher
        .register("/", Arc::new(store))
        .with_context(|| format!("registering {}", args.storage.display()))?;

    for spec in &args.passthrough {
        let (prefix, dir) = spec
            .split_once('=')
            .context("--passthrough expects PREFIX=DIR")?;
        dispatcher
            .register(prefix, Arc::new(PassthroughStore::new(dir)))
            .with_context(|| format!("registering pass-through {spec}"))?;
    }

    let session = cloakfs_fuse::spawn_mount(Arc::clone(&dispatcher), &args.mountpoint)
        .with_context(|| format!("mounting at {}", args.mountpoint.display()))?;
    info!(
        storage = %args.storage.display(),
        mountpoint = %args.mountpoint.display(),
        "mounted; press ctrl-c to unmount"
    );

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("installing signal handler")?;
    stop_rx.recv().ok();

    info!("unmounting");
    drop(session);
    Ok(())
}
