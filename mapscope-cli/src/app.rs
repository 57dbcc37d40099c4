use std::{net::IpAddr, path::PathBuf};

use clap::{Parser, Subcommand};

/// mapscope - collaborative renaming of obfuscated programs
#[derive(Debug, Parser)]
#[command(name = "mapscope", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Host a sync server for the given artifact until interrupted.
    Serve {
        /// The artifact clients must have open; its SHA-1 is checked at login.
        #[arg(long, value_name = "FILE")]
        jar: PathBuf,

        /// TCP port to listen on.
        #[arg(short, long, default_value_t = mapscope::network::DEFAULT_PORT)]
        port: u16,

        /// Address to bind to.
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Password clients must present. Without one, anyone may join.
        #[arg(long)]
        password: Option<String>,
    },

    /// Print the artifact checksum used by the login handshake.
    Checksum {
        /// Path to the artifact.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}
