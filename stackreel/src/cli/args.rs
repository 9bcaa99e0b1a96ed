//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackreel", about = "Replay and symbolicate a recorded call-stack log")]
pub struct Args {
    /// Event log written by the recorder's dump
    #[arg(default_value = "callstacks.bin")]
    pub log: PathBuf,

    /// Export the resolved stream as Chrome Trace Event JSON
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Print at most N callstacks (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub limit: u64,

    /// Print a ranked table of capture sites after the replay
    #[arg(long)]
    pub hotspots: bool,
}
