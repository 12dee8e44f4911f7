//! Command-line interface for dvrvault.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::{cmd_init, cmd_list_records, cmd_sweep};

/// dvrvault - archive for live-stream DVR recordings
/// Uploads finished recordings to WebDAV and serves them back with range support
#[derive(Parser)]
#[command(name = "dvrvault")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the search paths
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the callback and playback server with the retention sweep
    Daemon,

    /// Run a single retention pass against the remote store
    Sweep,

    /// List the stored recordings of a stream
    #[command(alias = "ls", alias = "l")]
    List {
        /// Stream name
        stream: String,
    },

    /// Create default config file
    Init,
}
