#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use goldfish_machine::{Machine, MachineConfig};
use goldfish_platform::time::{MonotonicClock, SystemClock};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Boot a goldfish platform from a JSON config and print its device map")]
struct Args {
    /// Machine config (JSON). Fields left out keep the platform defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// `tracing` filter directive, e.g. `info` or `goldfish_platform=debug`.
    ///
    /// Falls back to `RUST_LOG`, then `warn`.
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("bad --log-level {level:?}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<MachineConfig> {
    let Some(path) = path else {
        return Ok(MachineConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    MachineConfig::from_json(&json).with_context(|| format!("invalid config {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;

    let cfg = load_config(args.config.as_deref())?;
    tracing::debug!(?cfg, "loaded machine config");

    let machine = Machine::new(cfg, MonotonicClock::new(), SystemClock)
        .context("failed to build machine")?;

    let map = serde_json::to_string_pretty(&machine.device_map())?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{map}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_means_defaults() {
        assert_eq!(load_config(None).unwrap(), MachineConfig::default());
    }

    #[test]
    fn unreadable_config_names_the_file() {
        let err = load_config(Some(Path::new("/nonexistent/goldfish.json"))).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/goldfish.json"));
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from([
            "goldfish-machine",
            "--config",
            "a.json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("a.json")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }
}
