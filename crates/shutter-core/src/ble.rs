//! Tracks whether the configured Bluetooth LE remote is connected and
//! publishes that into a [`ConnectivityGate`].
//!
//! A `DeviceWatcher` over BLE devices reports arrivals and removals; for the
//! device whose name matches, we open a `BluetoothLEDevice` and follow its
//! `ConnectionStatusChanged` events. Every callback runs on a WinRT thread
//! pool thread, never on the hook thread.

use crate::gate::ConnectivityGate;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};
use windows::core::{IInspectable, HSTRING};
use windows::Devices::Bluetooth::{BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Devices::Enumeration::{DeviceInformation, DeviceInformationUpdate, DeviceWatcher};
use windows::Foundation::{EventRegistrationToken, TypedEventHandler};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("failed to start Bluetooth LE watcher: {0}")]
    Watcher(#[from] windows::core::Error),
}

struct MonitorState {
    gate: ConnectivityGate,
    device_id: Option<HSTRING>,
    device: Option<(BluetoothLEDevice, EventRegistrationToken)>,
}

type SharedState = Arc<Mutex<MonitorState>>;

pub struct BleMonitor {
    watcher: DeviceWatcher,
    state: SharedState,
}

impl BleMonitor {
    /// Starts watching for `device_name` (case-insensitive).
    pub fn start(device_name: &str, gate: ConnectivityGate) -> Result<Self, MonitorError> {
        info!("Starting BTLE watcher...");
        let state: SharedState = Arc::new(Mutex::new(MonitorState {
            gate,
            device_id: None,
            device: None,
        }));

        let watcher = DeviceInformation::CreateWatcherAqsFilter(&BluetoothLEDevice::GetDeviceSelector()?)?;

        let added_state = Arc::clone(&state);
        let wanted = device_name.to_string();
        watcher.Added(&TypedEventHandler::<DeviceWatcher, DeviceInformation>::new(
            move |_, info| {
                if let Some(info) = info.as_ref() {
                    let name = info.Name()?.to_string();
                    if name.eq_ignore_ascii_case(&wanted) {
                        let id = info.Id()?;
                        info!("Found: {} ({})", name, id);
                        connect(&added_state, &id);
                    }
                }
                Ok(())
            },
        ))?;

        let removed_state = Arc::clone(&state);
        let removed_name = device_name.to_string();
        watcher.Removed(&TypedEventHandler::<DeviceWatcher, DeviceInformationUpdate>::new(
            move |_, update| {
                if let Some(update) = update.as_ref() {
                    let id = update.Id()?;
                    let tracked = removed_state.lock().device_id.as_ref() == Some(&id);
                    if tracked {
                        info!("Removed: {}", removed_name);
                        release(&removed_state, true);
                        removed_state.lock().device_id = None;
                    }
                }
                Ok(())
            },
        ))?;

        watcher.EnumerationCompleted(&TypedEventHandler::<DeviceWatcher, IInspectable>::new(
            |_, _| {
                info!("Watcher enum complete.");
                Ok(())
            },
        ))?;
        watcher.Stopped(&TypedEventHandler::<DeviceWatcher, IInspectable>::new(|_, _| {
            info!("Watcher stopped.");
            Ok(())
        }))?;

        watcher.Start()?;
        info!("Watcher started.");

        // The lookup blocks on WinRT; keep it off the caller's thread.
        let initial_state = Arc::clone(&state);
        let initial_name = device_name.to_string();
        if let Err(e) = std::thread::Builder::new()
            .name("ble-initial-find".to_string())
            .spawn(move || {
                if let Err(e) = initial_find(&initial_state, &initial_name) {
                    warn!("Initial find failed: {}", e);
                }
            })
        {
            warn!("Could not spawn initial device lookup: {}", e);
        }

        Ok(Self { watcher, state })
    }

    pub fn stop(self) {
        let _ = self.watcher.Stop();
        release(&self.state, true);
    }
}

fn initial_find(state: &SharedState, device_name: &str) -> windows::core::Result<()> {
    let selector = BluetoothLEDevice::GetDeviceSelectorFromDeviceName(&HSTRING::from(device_name))?;
    let devices = DeviceInformation::FindAllAsyncAqsFilter(&selector)?.get()?;
    if devices.Size()? > 0 {
        let first = devices.GetAt(0)?;
        let id = first.Id()?;
        info!("Initial find: {} ({}). Connecting...", first.Name()?, id);
        connect(state, &id);
    } else {
        info!("Initial find: '{}' not found.", device_name);
    }
    Ok(())
}

fn connect(state: &SharedState, id: &HSTRING) {
    {
        let s = state.lock();
        if s.device.is_some() && s.gate.get() {
            return;
        }
    }
    info!("Connecting to {}", id);
    release(state, false);

    let device = match BluetoothLEDevice::FromIdAsync(id).and_then(|op| op.get()) {
        Ok(device) => device,
        Err(e) => {
            warn!("Connect error: {}", e);
            release(state, false);
            return;
        }
    };

    let gate = state.lock().gate.clone();
    let token = device.ConnectionStatusChanged(&TypedEventHandler::<BluetoothLEDevice, IInspectable>::new(
        move |sender, _| {
            let status = sender
                .as_ref()
                .and_then(|d| d.ConnectionStatus().ok())
                .unwrap_or(BluetoothConnectionStatus::Disconnected);
            debug!("BT Status Event: {:?}", status);
            update_status(&gate, status);
            Ok(())
        },
    ));

    let status = device
        .ConnectionStatus()
        .unwrap_or(BluetoothConnectionStatus::Disconnected);
    info!(
        "Device object obtained for {}. Status: {:?}",
        device.Name().map(|n| n.to_string()).unwrap_or_default(),
        status
    );

    let mut s = state.lock();
    s.device_id = Some(id.clone());
    match token {
        Ok(token) => s.device = Some((device, token)),
        Err(e) => {
            warn!("Cannot follow connection status: {}", e);
            let _ = device.Close();
        }
    }
    update_status(&s.gate, status);
}

/// Drops the tracked device and reports it disconnected.
fn release(state: &SharedState, log: bool) {
    let mut s = state.lock();
    if let Some((device, token)) = s.device.take() {
        if log {
            info!(
                "Cleaning up BT device: {}",
                device.DeviceId().map(|id| id.to_string()).unwrap_or_default()
            );
        }
        let _ = device.RemoveConnectionStatusChanged(token);
        let _ = device.Close();
    }
    update_status(&s.gate, BluetoothConnectionStatus::Disconnected);
}

fn update_status(gate: &ConnectivityGate, status: BluetoothConnectionStatus) {
    let connected = status == BluetoothConnectionStatus::Connected;
    if gate.set(connected) {
        info!("Connection state CHANGED -> {:?}", status);
    }
}
