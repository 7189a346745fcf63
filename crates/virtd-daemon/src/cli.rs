//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// virtd - remote management daemon for virtualization hosts
#[derive(Parser, Debug)]
#[command(name = "virtd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon (the default)
    Run,
    /// Print a sample configuration file and exit
    GenerateConfig,
}
