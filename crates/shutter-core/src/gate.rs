use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Latest known connection state of the monitored remote.
///
/// Cloned handles share one flag: the connectivity monitor writes from its own
/// threads, the hook callback reads without blocking. Only the last value is
/// kept.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityGate {
    connected: Arc<AtomicBool>,
}

impl ConnectivityGate {
    /// Starts disconnected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the value changed.
    pub fn set(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::AcqRel) != connected
    }

    pub fn get(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_starts_disconnected() {
        assert!(!ConnectivityGate::new().get());
    }

    #[test]
    fn test_set_reports_transitions() {
        let gate = ConnectivityGate::new();
        assert!(gate.set(true));
        assert!(!gate.set(true));
        assert!(gate.set(false));
        assert!(!gate.get());
    }

    #[test]
    fn test_clones_share_state_across_threads() {
        let gate = ConnectivityGate::new();
        let writer = gate.clone();
        std::thread::spawn(move || {
            writer.set(false);
            writer.set(true);
        })
        .join()
        .unwrap();

        assert!(gate.get());
    }
}
