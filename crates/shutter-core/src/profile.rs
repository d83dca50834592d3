use crate::types::KeyCode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// One persisted `source -> target` mapping under a profile (device) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeymapEntry {
    pub profile: String,
    pub source: KeyCode,
    pub target: KeyCode,
}

impl KeymapEntry {
    pub fn new(profile: impl Into<String>, source: KeyCode, target: KeyCode) -> Self {
        Self {
            profile: profile.into(),
            source,
            target,
        }
    }
}

/// Source key to target key for a single device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    map: BTreeMap<KeyCode, KeyCode>,
}

impl MappingTable {
    pub fn get(&self, source: KeyCode) -> Option<KeyCode> {
        self.map.get(&source).copied()
    }

    /// Returns the previous target when `source` was already mapped.
    pub fn insert(&mut self, source: KeyCode, target: KeyCode) -> Option<KeyCode> {
        self.map.insert(source, target)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries ordered by source key.
    pub fn iter(&self) -> impl Iterator<Item = (KeyCode, KeyCode)> + '_ {
        self.map.iter().map(|(s, t)| (*s, *t))
    }
}

impl FromIterator<(KeyCode, KeyCode)> for MappingTable {
    fn from_iter<I: IntoIterator<Item = (KeyCode, KeyCode)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Name as first seen; lookups ignore case.
    pub name: String,
    pub table: MappingTable,
}

/// All mapping tables, keyed by case-insensitive profile name.
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    profiles: HashMap<String, Profile>,
    order: Vec<String>,
    active: Option<String>,
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds every table from `entries`, discarding prior state.
    /// A repeated source within one profile keeps the last target.
    pub fn load<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = KeymapEntry>,
    {
        self.profiles.clear();
        self.order.clear();
        for entry in entries {
            let profile = self.profile_entry(&entry.profile);
            if let Some(previous) = profile.table.insert(entry.source, entry.target) {
                warn!(
                    "Duplicate key '{}' in [{}] ('{}' replaced by '{}')",
                    entry.source, profile.name, previous, entry.target
                );
            }
        }
        debug!("Profile store loaded with {} profiles", self.profiles.len());
    }

    /// Points the remapper at `name`. The profile does not have to exist.
    pub fn set_active_profile(&mut self, name: impl Into<String>) {
        self.active = Some(name.into());
    }

    pub fn active_profile(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_table(&self) -> Option<&MappingTable> {
        self.active.as_deref().and_then(|name| self.get(name))
    }

    pub fn get(&self, profile: &str) -> Option<&MappingTable> {
        self.profiles.get(&fold(profile)).map(|p| &p.table)
    }

    /// Upserts one mapping, creating the profile on first use.
    /// Callers persist the entry right after.
    pub fn put(&mut self, profile: &str, source: KeyCode, target: KeyCode) -> Option<KeyCode> {
        self.profile_entry(profile).table.insert(source, target)
    }

    pub fn contains(&self, profile: &str) -> bool {
        self.profiles.contains_key(&fold(profile))
    }

    /// Profile names in first-seen order.
    pub fn profile_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.profiles.get(key))
            .map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    fn profile_entry(&mut self, name: &str) -> &mut Profile {
        let key = fold(name);
        if !self.profiles.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.profiles.entry(key).or_insert_with(|| Profile {
            name: name.to_string(),
            table: MappingTable::default(),
        })
    }
}
