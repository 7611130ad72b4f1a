//! Keygen command: emit fresh key material as lowercase hex.

use anyhow::{Result, bail};
use clap::Args as ClapArgs;
use rand::RngCore;

#[derive(ClapArgs)]
pub struct Args {
    /// Number of random bytes (the mount key is 32)
    #[arg(default_value = "32")]
    pub length: String,
}

pub fn run(args: &Args) -> Result<()> {
    // Parsed by hand so a bad length exits 1 like every other usage error.
    let Ok(length) = args.length.parse::<i64>() else {
        bail!("length must be an integer, got {:?}", args.length);
    };
    if length <= 0 {
        bail!("length must be positive, got {length}");
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut buf = vec![0u8; length as usize];
    rand::rng().fill_bytes(&mut buf);
    println!("{}", hex::encode(buf));
    Ok(())
}
