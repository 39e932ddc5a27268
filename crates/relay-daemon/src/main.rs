mod cli;
mod exit_codes;
mod logging;
mod supervisor;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::{log_supervisor_critical, StdFileSystem};

static FILESYSTEM: StdFileSystem = StdFileSystem;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            log_supervisor_critical!("daemon exited on an unhandled error", error = %e);
            exit_codes::SOFTWARE
        }
    };
    std::process::exit(code);
}

/// Parses arguments, loads config, and runs the supervisor to completion.
/// Known, classifiable failures resolve to their matching sysexits code;
/// anything else propagates via `?` and falls through to `SOFTWARE` in
/// `main`.
async fn run() -> Result<i32> {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print().context("failed to print usage")?;
            return Ok(exit_codes::USAGE);
        }
    };
    logging::init(cli.dev);

    if !cfg!(target_os = "linux") {
        log_supervisor_critical!("this daemon requires linux (same-device rename and st_dev invariants)");
        return Ok(exit_codes::PLATFORM_UNAVAILABLE);
    }

    let fs: &'static dyn relay_core::FileSystem = &FILESYSTEM;

    let config = match relay_config::RelayConfig::load(&cli.config, fs) {
        Ok(config) => config,
        Err(e @ relay_config::ConfigError::Read { .. }) => {
            log_supervisor_critical!("failed to read configuration file", error = %e);
            return Ok(exit_codes::OS_ERROR);
        }
        Err(e) => {
            log_supervisor_critical!("failed to load configuration", error = %e);
            return Ok(exit_codes::CONFIG);
        }
    };

    match supervisor::run(config, fs).await {
        Ok(supervisor::Outcome::Clean) => Ok(exit_codes::OK),
        Ok(supervisor::Outcome::Operational) => Ok(exit_codes::TEMP_FAIL),
        Err(supervisor::SupervisorError::Setup(msg)) => {
            log_supervisor_critical!("supervisor setup failed", error = %msg);
            Ok(exit_codes::CONFIG)
        }
    }
}
