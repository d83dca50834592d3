pub mod config;
pub mod engine;
pub mod gate;
pub mod keymap;
pub mod mode;
pub mod profile;
pub mod training;
pub mod types;
pub mod vk_map;

#[cfg(windows)]
pub mod ble;
#[cfg(windows)]
pub mod keyboard_hook;

pub use engine::{KeySynthesizer, RemapEngine, SynthesisGuard};
pub use gate::ConnectivityGate;
pub use profile::{KeymapEntry, MappingTable, ProfileStore};
pub use types::{KeyAction, KeyCode, KeyEdge, KeyEvent};
