#[cfg_attr(not(windows), allow(dead_code))]
mod console;
#[cfg(windows)]
mod host;

use clap::Parser;
use shutter_core::config::Config;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Remaps a Bluetooth LE shutter remote's buttons to keyboard keys while the
/// remote is connected.
#[derive(Debug, Parser)]
#[command(name = "shutter-remap", version, about)]
struct Cli {
    /// Train mappings for this remote instead of remapping.
    #[arg(value_name = "DEVICE", value_parser = parse_device_name)]
    training_device: Option<String>,

    /// Keymap file (defaults to the per-user config directory).
    #[arg(long, env = "SHUTTER_KEYMAP")]
    keymap: Option<PathBuf>,

    /// Remote to remap for; defaults to the first keymap section.
    /// Training takes its remote from DEVICE instead.
    #[arg(long, env = "SHUTTER_DEVICE", conflicts_with = "training_device")]
    device: Option<String>,
}

fn parse_device_name(raw: &str) -> Result<String, String> {
    if raw.trim().is_empty() {
        Err("device name must not be blank".to_string())
    } else {
        Ok(raw.to_string())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.training_device {
        Some(device) => {
            let config = Config::resolve(cli.keymap, Some(device.clone()))?;
            run_training(&config, &device)
        }
        None => {
            let config = Config::resolve(cli.keymap, cli.device)?;
            info!("Starting ABShutter Remapper");
            run_remap(&config)
        }
    }
}

#[cfg(windows)]
fn run_remap(config: &Config) -> anyhow::Result<()> {
    host::run_remap(config)
}

#[cfg(windows)]
fn run_training(config: &Config, device: &str) -> anyhow::Result<()> {
    host::run_training(config, device)
}

#[cfg(not(windows))]
fn run_remap(_config: &Config) -> anyhow::Result<()> {
    anyhow::bail!("remapping needs the Windows low-level keyboard hook")
}

#[cfg(not(windows))]
fn run_training(_config: &Config, _device: &str) -> anyhow::Result<()> {
    anyhow::bail!("training needs the Windows low-level keyboard hook")
}
