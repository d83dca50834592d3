//! Interactive capture of `remote key -> keyboard key` pairs.
//!
//! The operator presses a button on the remote (source), then the keyboard
//! key it should produce (target). Each completed pair is stored and written
//! to the keymap before the confirmation notice goes out. Escape ends the
//! session.

use crate::keymap::KeymapStore;
use crate::profile::{MappingTable, ProfileStore};
use crate::types::{KeyAction, KeyCode, KeyEdge, KeyEvent};
use crossbeam_channel::Sender;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Idle,
    AwaitingTarget(KeyCode),
    Closed,
}

/// Operator-facing progress, delivered off the hook thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingNotice {
    SourceCaptured(KeyCode),
    Mapped { source: KeyCode, target: KeyCode },
    ModifierRejected(KeyCode),
    PersistFailed {
        source: KeyCode,
        target: KeyCode,
        reason: String,
    },
    Closed,
}

pub struct TrainingSession {
    profile: String,
    state: TrainingState,
    store: ProfileStore,
    keymap: Box<dyn KeymapStore + Send>,
    notices: Sender<TrainingNotice>,
    exit_key: KeyCode,
}

impl TrainingSession {
    pub fn new(
        profile: impl Into<String>,
        store: ProfileStore,
        keymap: Box<dyn KeymapStore + Send>,
        notices: Sender<TrainingNotice>,
    ) -> Self {
        Self {
            profile: profile.into(),
            state: TrainingState::Idle,
            store,
            keymap,
            notices,
            exit_key: KeyCode::ESCAPE,
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == TrainingState::Closed
    }

    /// The table being trained, as it stands in memory.
    pub fn learned(&self) -> Option<&MappingTable> {
        self.store.get(&self.profile)
    }

    pub fn process_key(&mut self, event: KeyEvent) -> KeyAction {
        if self.is_closed() || event.injected || event.edge == KeyEdge::Up {
            return KeyAction::Pass;
        }

        let key = event.key;
        if key == self.exit_key {
            info!("{} pressed, ending training.", key);
            if let TrainingState::AwaitingTarget(pending) = self.state {
                debug!("Discarding pending source {}", pending);
            }
            self.state = TrainingState::Closed;
            self.notify(TrainingNotice::Closed);
            return KeyAction::Block;
        }

        debug!("Train KeyDown: {}", key);
        let current = self.state;
        self.state = match current {
            TrainingState::Idle => {
                self.notify(TrainingNotice::SourceCaptured(key));
                TrainingState::AwaitingTarget(key)
            }
            TrainingState::AwaitingTarget(_) if key.is_modifier() => {
                self.notify(TrainingNotice::ModifierRejected(key));
                TrainingState::Idle
            }
            TrainingState::AwaitingTarget(source) => {
                self.commit(source, key);
                TrainingState::Idle
            }
            TrainingState::Closed => TrainingState::Closed,
        };
        KeyAction::Block
    }

    fn commit(&mut self, source: KeyCode, target: KeyCode) {
        self.store.put(&self.profile, source, target);
        match self.keymap.write(&self.profile, source, target) {
            Ok(()) => {
                info!("MAP {} -> {} in [{}]", source, target, self.profile);
                self.notify(TrainingNotice::Mapped { source, target });
            }
            Err(e) => {
                error!("Failed to persist {} -> {}: {}", source, target, e);
                self.notify(TrainingNotice::PersistFailed {
                    source,
                    target,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn notify(&self, notice: TrainingNotice) {
        // Nobody listening is fine; the hook must not stall on the console.
        let _ = self.notices.send(notice);
    }
}
