//! Wires the core engine to the Windows keyboard hook and BLE monitor.

use crate::console;
use anyhow::Context;
use shutter_core::ble::BleMonitor;
use shutter_core::config::Config;
use shutter_core::keyboard_hook::{self, WindowsSynthesizer};
use shutter_core::mode::Mode;
use shutter_core::training::TrainingSession;
use shutter_core::{ConnectivityGate, RemapEngine};
use tracing::{error, info, warn};

pub fn run_remap(config: &Config) -> anyhow::Result<()> {
    let loaded = config.load_profiles().context("failed to load keymap")?;
    info!("Target device: [{}]", loaded.device_name);

    let gate = ConnectivityGate::new();
    // Without a watcher the gate stays closed and every key passes through.
    let monitor = match BleMonitor::start(&loaded.device_name, gate.clone()) {
        Ok(monitor) => Some(monitor),
        Err(e) => {
            error!("{}", e);
            None
        }
    };

    let engine = RemapEngine::new(
        loaded.store,
        gate,
        keyboard_hook::synthesis_guard(),
        Box::new(WindowsSynthesizer),
    );

    if let Err(e) = keyboard_hook::install_ctrl_handler() {
        warn!("{}", e);
    }
    if let Err(e) = keyboard_hook::install_hook(Mode::Remap(engine)) {
        error!("FATAL: Failed to set main hook. Exiting.");
        if let Some(monitor) = monitor {
            monitor.stop();
        }
        return Err(e).context("keyboard hook registration failed");
    }

    info!("Remapper active. Close window or Ctrl+C to exit.");
    keyboard_hook::run_event_loop();

    info!("Cleaning up...");
    if let Some(monitor) = monitor {
        monitor.stop();
    }
    keyboard_hook::uninstall_hook();
    info!("Cleanup complete. Exiting.");
    Ok(())
}

pub fn run_training(config: &Config, device: &str) -> anyhow::Result<()> {
    let keymap = config.keymap();
    if let Some(dir) = keymap.path().parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let loaded = config.load_profiles().context("failed to load keymap")?;

    println!("--- Training Mode: [{}] ---", device);
    println!("INI: {}", keymap.path().display());
    println!("Ensure device is ON and PAIRED.");
    println!("Press REMOTE key, then KEYBOARD target key. ESC on keyboard to save/exit.");

    let (tx, rx) = crossbeam_channel::unbounded();
    let printer = std::thread::Builder::new()
        .name("training-console".to_string())
        .spawn(move || {
            for notice in rx {
                println!("{}", console::render_notice(&notice));
            }
        })
        .context("failed to spawn console thread")?;

    let session = TrainingSession::new(device, loaded.store, Box::new(keymap.clone()), tx);

    if let Err(e) = keyboard_hook::install_ctrl_handler() {
        warn!("{}", e);
    }
    if let Err(e) = keyboard_hook::install_hook(Mode::Training(session)) {
        error!("FATAL: Failed to set training hook.");
        // The session (and its sender) is already dropped, so this returns.
        let _ = printer.join();
        return Err(e).context("keyboard hook registration failed");
    }

    keyboard_hook::run_event_loop();

    let finished = keyboard_hook::uninstall_hook();
    let learned = match &finished {
        Some(Mode::Training(session)) => session
            .learned()
            .map(|table| console::render_learned(session.profile(), table)),
        _ => None,
    };
    // Dropping the session closes the channel and ends the printer.
    drop(finished);
    let _ = printer.join();
    info!("Training finished.");

    if let Some(learned) = learned {
        println!("\n{}", learned);
    }
    println!("\n{}", console::render_keymap_dump(keymap.raw_text()));
    Ok(())
}
