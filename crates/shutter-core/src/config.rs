use crate::keymap::{IniKeymap, KeymapError};
use crate::profile::ProfileStore;
use std::path::PathBuf;
use tracing::{info, warn};

pub const DEFAULT_DEVICE_NAME: &str = "AB Shutter3";
const APP_DIR_NAME: &str = "ABShutter3";
const KEYMAP_FILE_NAME: &str = "keymap.ini";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,
    #[error(transparent)]
    Keymap(#[from] KeymapError),
}

/// `%APPDATA%\ABShutter3\keymap.ini` on Windows, the XDG config dir elsewhere.
pub fn default_keymap_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(KEYMAP_FILE_NAME))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub keymap_path: PathBuf,
    /// Explicit remote name; otherwise the first keymap section is used.
    pub device_name: Option<String>,
}

/// Profiles read at startup plus the device they are aimed at.
#[derive(Debug, Clone)]
pub struct LoadedProfiles {
    pub store: ProfileStore,
    pub device_name: String,
}

impl Config {
    pub fn resolve(keymap_path: Option<PathBuf>, device_name: Option<String>) -> Result<Self, ConfigError> {
        let keymap_path = match keymap_path {
            Some(path) => path,
            None => default_keymap_path().ok_or(ConfigError::NoPlatformConfigDir)?,
        };
        let device_name = device_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        Ok(Self {
            keymap_path,
            device_name,
        })
    }

    pub fn keymap(&self) -> IniKeymap {
        IniKeymap::new(&self.keymap_path)
    }

    /// Reads the keymap and picks the active profile: the configured device,
    /// else the first section, else [`DEFAULT_DEVICE_NAME`].
    pub fn load_profiles(&self) -> Result<LoadedProfiles, ConfigError> {
        let keymap = self.keymap();
        info!("INI: {}", keymap.path().display());
        let parsed = keymap.load()?;

        let device_name = match (&self.device_name, parsed.sections.first()) {
            (Some(name), _) => name.clone(),
            (None, Some(first)) => {
                info!("Target set from INI: [{}]", first);
                first.clone()
            }
            (None, None) => DEFAULT_DEVICE_NAME.to_string(),
        };

        let mut store = ProfileStore::new();
        store.load(parsed.entries);
        store.set_active_profile(device_name.clone());

        if store.is_empty() {
            warn!("No maps loaded from INI.");
        } else if !store.contains(&device_name) {
            warn!("No map found for target '{}'.", device_name);
        }

        Ok(LoadedProfiles { store, device_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyCode;

    fn write_keymap(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("keymap.ini");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_first_section_is_default_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_keymap(&dir, "[Clicker]\nVolumeUp=Right\n[AB Shutter3]\nVolumeUp=Return\n");
        let config = Config::resolve(Some(path), None).unwrap();

        let loaded = config.load_profiles().unwrap();
        assert_eq!(loaded.device_name, "Clicker");
        assert_eq!(
            loaded.store.active_table().and_then(|t| t.get(KeyCode::new(0xAF))),
            Some(KeyCode::new(0x27))
        );
    }

    #[test]
    fn test_explicit_device_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_keymap(&dir, "[Clicker]\nVolumeUp=Right\n[AB Shutter3]\nVolumeUp=Return\n");
        let config = Config::resolve(Some(path), Some(" ab shutter3 ".into())).unwrap();

        let loaded = config.load_profiles().unwrap();
        assert_eq!(loaded.device_name, "ab shutter3");
        assert_eq!(
            loaded.store.active_table().and_then(|t| t.get(KeyCode::new(0xAF))),
            Some(KeyCode::new(0x0D))
        );
    }

    #[test]
    fn test_missing_keymap_uses_default_device() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::resolve(Some(dir.path().join("absent.ini")), Some("   ".into())).unwrap();

        let loaded = config.load_profiles().unwrap();
        assert_eq!(loaded.device_name, DEFAULT_DEVICE_NAME);
        assert!(loaded.store.is_empty());
        assert_eq!(loaded.store.active_profile(), Some(DEFAULT_DEVICE_NAME));
    }
}
