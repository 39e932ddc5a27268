use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "relayd", about = "Harvests, stages, and uploads pcap captures")]
pub struct Cli {
    /// Enable pretty, debug-level console logging.
    #[arg(long)]
    pub dev: bool,

    /// Path to the INI configuration file.
    #[arg(long, default_value = "config.ini")]
    pub config: PathBuf,
}
