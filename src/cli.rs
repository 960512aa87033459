//! Command line interface for the `osclink` binary.
//!
//! Kept free of crate types so the build script can render a manual page
//! from it.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

/// Command line arguments for the `osclink` binary.
#[derive(Debug, Parser)]
#[command(
    name = "osclink",
    version,
    about = "Talk to a 360° camera over its HTTP API"
)]
pub struct Cli {
    /// Digest credentials.
    #[command(flatten)]
    pub auth: AuthArgs,

    /// Serve Prometheus metrics on this address.
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Digest authentication options.
#[derive(Debug, Args)]
pub struct AuthArgs {
    /// User name for digest authentication.
    #[arg(short, long, global = true)]
    pub username: Option<String>,

    /// Password; defaults to the serial number for `THETA…` user names.
    #[arg(short, long, global = true, requires = "username")]
    pub password: Option<String>,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream live-preview frames.
    Preview {
        /// Device URL, e.g. `http://192.168.1.1`.
        endpoint: String,
        /// Stop after this many frames.
        #[arg(short = 'n', long)]
        frames: Option<u64>,
        /// Write each frame as `frame-<n>.jpg` into this directory.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Upload firmware files.
    Upload {
        /// Device URL.
        endpoint: String,
        /// Upload API path of the device model.
        #[arg(long)]
        api_path: String,
        /// Firmware file; repeat for multi-part images.
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,
    },
    /// Poll an asynchronous command until it finishes.
    ConvertStatus {
        /// Device URL.
        endpoint: String,
        /// Command id returned by the device.
        id: String,
        /// Poll interval in milliseconds.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}
