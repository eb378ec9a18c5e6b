//! CLI definitions for chatmirror.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Config file used when `--config` is not given.
pub(crate) const DEFAULT_CONFIG: &str = "chatmirror.toml";

/// chatmirror CLI.
#[derive(Parser)]
#[command(name = "chatmirror")]
#[command(about = "Mirror an IDE's AI chat panel to remote viewers")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (default: ./chatmirror.toml if present)
    #[arg(short, long, global = true, env = "CHATMIRROR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the relay in foreground (default)
    Run {
        /// Server host (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Server port (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// List the targets of a debug port and show which one would be mirrored
    Targets {
        /// Debug port (default: devtools.default_port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Capture the chat view once and print it as JSON
    Snapshot {
        /// Debug port (default: devtools.default_port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show which configured debug ports are running
    Slots,
}
