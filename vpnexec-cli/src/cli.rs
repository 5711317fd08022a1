//! CLI argument definitions

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "vpn-exec")]
#[command(about = "Run a command inside the VPN mount and network namespaces", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Mount namespace reference (only when not running set-id)
    #[arg(long, value_name = "PATH")]
    pub mount_ns: Option<PathBuf>,

    /// Network namespace reference (only when not running set-id)
    #[arg(long, value_name = "PATH")]
    pub net_ns: Option<PathBuf>,

    /// Command to run, followed by its arguments
    #[arg(trailing_var_arg = true, value_name = "COMMAND")]
    pub command: Vec<OsString>,
}
