use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Windows virtual-key code identifying a key.
///
/// The string form is the `System.Windows.Forms.Keys` member name (`A`,
/// `Return`, `VolumeUp`, ...). Unknown codes render as plain decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyCode(u16);

impl KeyCode {
    pub const ESCAPE: KeyCode = KeyCode::new(0x1B);

    pub const fn new(vk: u16) -> Self {
        Self(vk)
    }

    pub const fn vk(self) -> u16 {
        self.0
    }

    /// Canonical key name, if the code has one.
    pub fn name(self) -> Option<&'static str> {
        crate::vk_map::vk_to_name(self.0)
    }

    /// Shift, Control, Alt (Menu) and Windows keys, generic or sided.
    pub fn is_modifier(self) -> bool {
        crate::vk_map::is_modifier_vk(self.0)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key name '{0}'")]
pub struct ParseKeyError(pub String);

impl FromStr for KeyCode {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(vk) = crate::vk_map::name_to_vk(trimmed) {
            return Ok(KeyCode(vk));
        }
        // Numeric form, as accepted by Enum.TryParse on the Keys enum.
        match trimmed.parse::<u16>() {
            Ok(vk) if vk <= 0xFF => Ok(KeyCode(vk)),
            _ => Err(ParseKeyError(s.to_string())),
        }
    }
}

impl TryFrom<String> for KeyCode {
    type Error = ParseKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyCode> for String {
    fn from(key: KeyCode) -> Self {
        key.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEdge {
    Down,
    Up,
}

/// A single key transition delivered by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub edge: KeyEdge,
    /// Set when the event carries our own injection marker.
    pub injected: bool,
}

impl KeyEvent {
    pub const fn down(key: KeyCode) -> Self {
        Self {
            key,
            edge: KeyEdge::Down,
            injected: false,
        }
    }

    pub const fn up(key: KeyCode) -> Self {
        Self {
            key,
            edge: KeyEdge::Up,
            injected: false,
        }
    }

    pub const fn injected(mut self) -> Self {
        self.injected = true;
        self
    }

    pub fn is_down(&self) -> bool {
        self.edge == KeyEdge::Down
    }
}

/// Action to be taken by the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Pass,
    Block,
}
