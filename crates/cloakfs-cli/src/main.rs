#![deny(unsafe_code)]

//! `cloakfs` — mount a directory as an encrypting overlay filesystem.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Encrypting overlay filesystem
#[derive(Parser)]
#[command(name = "cloakfs")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Generate a mount key
    cloakfs keygen > key.hex

    # Mount an encrypted tree
    cloakfs mount ~/encrypted ~/clear $(cat key.hex)

    # Mount with an unencrypted subtree next to it
    cloakfs mount ~/encrypted ~/clear $(cat key.hex) --passthrough /plain=~/public
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a random key and print it as lowercase hex
    Keygen(commands::keygen::Args),

    /// Mount a backing directory as a decrypted view
    Mount(commands::mount::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Keygen(args) => commands::keygen::run(&args),
        Commands::Mount(args) => commands::mount::run(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
