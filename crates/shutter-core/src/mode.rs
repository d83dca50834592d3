use crate::engine::RemapEngine;
use crate::training::TrainingSession;
use crate::types::{KeyAction, KeyEvent};

/// The single consumer attached to the keyboard hook.
pub enum Mode {
    Remap(RemapEngine),
    Training(TrainingSession),
}

impl Mode {
    pub fn process_key(&mut self, event: KeyEvent) -> KeyAction {
        match self {
            Mode::Remap(engine) => engine.process_key(event),
            Mode::Training(session) => session.process_key(event),
        }
    }

    /// True once the consumer wants the hook loop to stop.
    pub fn is_finished(&self) -> bool {
        match self {
            Mode::Remap(_) => false,
            Mode::Training(session) => session.is_closed(),
        }
    }
}
