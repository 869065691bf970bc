//! Root CLI structure for gothic-rs

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gothic-rs")]
#[command(about = "Command-line tools for ZenGin animation assets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clip, model script and playback operations
    Anim {
        #[command(subcommand)]
        command: crate::commands::anim::AnimCommands,
    },
}
