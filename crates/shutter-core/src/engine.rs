use crate::gate::ConnectivityGate;
use crate::profile::ProfileStore;
use crate::types::{KeyAction, KeyCode, KeyEdge, KeyEvent};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("input injection rejected for {key} ({edge:?}): {reason}")]
    Rejected {
        key: KeyCode,
        edge: KeyEdge,
        reason: String,
    },
}

/// Injects key events as if typed on a keyboard.
pub trait KeySynthesizer: Send {
    fn send(&mut self, key: KeyCode, edge: KeyEdge) -> Result<(), InjectError>;
}

/// Raised while the engine is emitting synthetic events.
///
/// The hook checks this before dispatching so the engine never sees (or
/// waits on) events it is causing itself.
#[derive(Debug, Clone, Default)]
pub struct SynthesisGuard {
    active: Arc<AtomicBool>,
}

impl SynthesisGuard {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn enter(&self) -> GuardScope<'_> {
        self.active.store(true, Ordering::Release);
        GuardScope(self)
    }
}

/// Lowers the guard on every exit path, unwinding included.
struct GuardScope<'a>(&'a SynthesisGuard);

impl Drop for GuardScope<'_> {
    fn drop(&mut self) {
        self.0.active.store(false, Ordering::Release);
    }
}

pub struct RemapEngine {
    store: ProfileStore,
    gate: ConnectivityGate,
    guard: SynthesisGuard,
    /// Source keys whose down edge we swallowed and whose up edge is pending.
    suppressed: HashSet<KeyCode>,
    synthesizer: Box<dyn KeySynthesizer>,
}

impl RemapEngine {
    pub fn new(
        store: ProfileStore,
        gate: ConnectivityGate,
        guard: SynthesisGuard,
        synthesizer: Box<dyn KeySynthesizer>,
    ) -> Self {
        Self {
            store,
            gate,
            guard,
            suppressed: HashSet::new(),
            synthesizer,
        }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn guard(&self) -> &SynthesisGuard {
        &self.guard
    }

    pub fn is_suppressed(&self, key: KeyCode) -> bool {
        self.suppressed.contains(&key)
    }

    pub fn suppressed_count(&self) -> usize {
        self.suppressed.len()
    }

    pub fn process_key(&mut self, event: KeyEvent) -> KeyAction {
        if event.injected || self.guard.is_active() {
            return KeyAction::Pass;
        }

        // An owned key stays owned until its release, even if the remote
        // dropped or the table changed while it was held.
        match event.edge {
            KeyEdge::Down if self.suppressed.contains(&event.key) => return KeyAction::Block,
            KeyEdge::Up if self.suppressed.remove(&event.key) => return KeyAction::Block,
            _ => {}
        }

        if !self.gate.get() {
            return KeyAction::Pass;
        }

        let target = match self.store.active_table().and_then(|t| t.get(event.key)) {
            Some(target) => target,
            None => return KeyAction::Pass,
        };

        match event.edge {
            KeyEdge::Down => {
                self.suppressed.insert(event.key);
                debug!("Remap DN {} -> {}", event.key, target);
                self.tap(target);
                KeyAction::Block
            }
            // Up without a tracked down.
            KeyEdge::Up => KeyAction::Pass,
        }
    }

    fn tap(&mut self, target: KeyCode) {
        let _scope = self.guard.enter();
        for edge in [KeyEdge::Down, KeyEdge::Up] {
            if let Err(e) = self.synthesizer.send(target, edge) {
                warn!("Synthesis failed: {}", e);
            }
        }
    }
}
