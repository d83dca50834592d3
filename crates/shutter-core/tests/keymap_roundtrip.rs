use crossbeam_channel::unbounded;
use shutter_core::keymap::{IniKeymap, KeymapStore};
use shutter_core::training::{TrainingNotice, TrainingSession, TrainingState};
use shutter_core::{KeyAction, KeyCode, KeyEvent, KeymapEntry, ProfileStore};
use std::collections::BTreeSet;

const VOLUME_UP: KeyCode = KeyCode::new(0xAF);
const VOLUME_DOWN: KeyCode = KeyCode::new(0xAE);
const ENTER: KeyCode = KeyCode::new(0x0D);
const SPACE: KeyCode = KeyCode::new(0x20);
const LEFT: KeyCode = KeyCode::new(0x25);
const L_CONTROL: KeyCode = KeyCode::new(0xA2);

fn as_set(entries: &[KeymapEntry]) -> BTreeSet<(String, KeyCode, KeyCode)> {
    entries
        .iter()
        .map(|e| (e.profile.to_lowercase(), e.source, e.target))
        .collect()
}

#[test]
fn written_entries_reload_to_same_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("keymap.ini");
    let mut keymap = IniKeymap::new(&path);

    let triples = [
        KeymapEntry::new("AB Shutter3", VOLUME_UP, ENTER),
        KeymapEntry::new("Clicker", VOLUME_DOWN, LEFT),
        KeymapEntry::new("AB Shutter3", ENTER, SPACE),
    ];
    for e in &triples {
        keymap.write(&e.profile, e.source, e.target).unwrap();
    }

    let loaded = keymap.load_all().unwrap();
    assert_eq!(as_set(&loaded), as_set(&triples));

    let mut store = ProfileStore::new();
    store.load(loaded);
    assert_eq!(store.get("ab shutter3").map(|t| t.len()), Some(2));
    assert_eq!(store.get("clicker").and_then(|t| t.get(VOLUME_DOWN)), Some(LEFT));
}

#[test]
fn duplicate_sources_collapse_to_last_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keymap.ini");
    std::fs::write(&path, "[Remote]\nVolumeUp=Return\nVolumeUp=Space\n").unwrap();

    let mut store = ProfileStore::new();
    store.load(IniKeymap::new(&path).load_all().unwrap());
    assert_eq!(store.get("Remote").and_then(|t| t.get(VOLUME_UP)), Some(SPACE));

    // Writing the key again leaves a single line behind.
    let mut keymap = IniKeymap::new(&path);
    keymap.write("remote", VOLUME_UP, LEFT).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.matches("VolumeUp=").count(), 1);
    assert_eq!(keymap.load_all().unwrap(), vec![KeymapEntry::new("Remote", VOLUME_UP, LEFT)]);
}

#[test]
fn utf16_keymap_stays_utf16() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keymap.ini");
    let mut raw = vec![0xFF, 0xFE];
    for unit in "[Remote]\r\nVolumeUp=Return\r\n".encode_utf16() {
        raw.extend_from_slice(&unit.to_le_bytes());
    }
    std::fs::write(&path, raw).unwrap();

    let mut keymap = IniKeymap::new(&path);
    keymap.write("Remote", VOLUME_DOWN, SPACE).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
    assert_eq!(keymap.load_all().unwrap().len(), 2);
}

#[test]
fn training_session_persists_to_ini() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keymap.ini");
    let (tx, rx) = unbounded();
    let mut session = TrainingSession::new("AB Shutter3", ProfileStore::new(), Box::new(IniKeymap::new(&path)), tx);

    let keys = [VOLUME_UP, ENTER, VOLUME_DOWN, L_CONTROL, VOLUME_DOWN, SPACE, VOLUME_UP, KeyCode::ESCAPE];
    for key in keys {
        assert_eq!(session.process_key(KeyEvent::down(key)), KeyAction::Block);
        assert_eq!(session.process_key(KeyEvent::up(key)), KeyAction::Pass);
    }
    assert_eq!(session.state(), TrainingState::Closed);

    let persisted = IniKeymap::new(&path).load_all().unwrap();
    assert_eq!(
        as_set(&persisted),
        as_set(&[
            KeymapEntry::new("AB Shutter3", VOLUME_UP, ENTER),
            KeymapEntry::new("AB Shutter3", VOLUME_DOWN, SPACE),
        ])
    );

    drop(session);
    let notices: Vec<_> = rx.iter().collect();
    assert_eq!(
        notices.iter().filter(|n| matches!(n, TrainingNotice::Mapped { .. })).count(),
        2
    );
    assert!(notices.contains(&TrainingNotice::ModifierRejected(L_CONTROL)));
    assert_eq!(notices.last(), Some(&TrainingNotice::Closed));
}
