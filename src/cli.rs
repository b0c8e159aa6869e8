use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "paceguard",
    version,
    about = "Real-time speaking pace monitor with energy-based VAD and haptic alerts"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor a recording as if it were live microphone input
    Monitor {
        /// WAV file to replay
        input: PathBuf,

        /// Replay as fast as possible instead of at real time
        #[arg(long)]
        fast: bool,

        /// Print each published state as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Estimate the speaking rate over a recording offline
    Analyze {
        /// WAV file to analyze
        input: PathBuf,

        /// Print the timeline as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Write a commented default config file
    InitConfig {
        /// Destination (defaults to the platform config location)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the resolved configuration
    ShowConfig,
}
