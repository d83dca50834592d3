use parking_lot::Mutex;
use shutter_core::engine::InjectError;
use shutter_core::{
    ConnectivityGate, KeyAction, KeyCode, KeyEdge, KeyEvent, KeySynthesizer, KeymapEntry,
    ProfileStore, RemapEngine, SynthesisGuard,
};
use std::sync::Arc;

const REMOTE: &str = "AB Shutter3";
const VOLUME_UP: KeyCode = KeyCode::new(0xAF);
const VOLUME_DOWN: KeyCode = KeyCode::new(0xAE);
const ENTER: KeyCode = KeyCode::new(0x0D);
const SPACE: KeyCode = KeyCode::new(0x20);
const RIGHT: KeyCode = KeyCode::new(0x27);

/// Records every injected edge and replays it into the hook, the way the OS
/// delivers our own `SendInput` events back to the low-level hook.
#[derive(Clone, Default)]
struct LoopbackSynthesizer {
    injected: Arc<Mutex<Vec<KeyEvent>>>,
}

impl KeySynthesizer for LoopbackSynthesizer {
    fn send(&mut self, key: KeyCode, edge: KeyEdge) -> Result<(), InjectError> {
        let event = match edge {
            KeyEdge::Down => KeyEvent::down(key),
            KeyEdge::Up => KeyEvent::up(key),
        };
        self.injected.lock().push(event);
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn make_engine(entries: &[(KeyCode, KeyCode)]) -> (RemapEngine, ConnectivityGate, LoopbackSynthesizer) {
    init_tracing();
    let mut store = ProfileStore::new();
    store.load(entries.iter().map(|(s, t)| KeymapEntry::new(REMOTE, *s, *t)));
    store.set_active_profile(REMOTE);
    let gate = ConnectivityGate::new();
    gate.set(true);
    let synth = LoopbackSynthesizer::default();
    let engine = RemapEngine::new(store, gate.clone(), SynthesisGuard::default(), Box::new(synth.clone()));
    (engine, gate, synth)
}

/// Feeds the physical event, then every event it caused, until quiet.
fn deliver(engine: &mut RemapEngine, synth: &LoopbackSynthesizer, event: KeyEvent) -> (KeyAction, Vec<KeyEvent>) {
    let action = engine.process_key(event);
    let mut emitted = Vec::new();
    loop {
        let pending: Vec<KeyEvent> = synth.injected.lock().drain(..).collect();
        if pending.is_empty() {
            break;
        }
        for e in pending {
            assert_eq!(engine.process_key(e.injected()), KeyAction::Pass);
            emitted.push(e);
        }
    }
    (action, emitted)
}

#[test]
fn chained_mappings_do_not_feed_back() {
    // VolumeUp -> Enter -> Space -> VolumeUp would loop forever if our own
    // taps were remapped.
    let (mut engine, _gate, synth) = make_engine(&[(VOLUME_UP, ENTER), (ENTER, SPACE), (SPACE, VOLUME_UP)]);

    let (down, emitted) = deliver(&mut engine, &synth, KeyEvent::down(VOLUME_UP));
    assert_eq!(down, KeyAction::Block);
    assert_eq!(emitted, vec![KeyEvent::down(ENTER), KeyEvent::up(ENTER)]);

    let (up, emitted) = deliver(&mut engine, &synth, KeyEvent::up(VOLUME_UP));
    assert_eq!(up, KeyAction::Block);
    assert!(emitted.is_empty());
    assert_eq!(engine.suppressed_count(), 0);
}

#[test]
fn held_remote_button_with_repeat_taps_once() {
    let (mut engine, _gate, synth) = make_engine(&[(VOLUME_UP, ENTER)]);

    let mut taps = 0;
    for _ in 0..25 {
        let (action, emitted) = deliver(&mut engine, &synth, KeyEvent::down(VOLUME_UP));
        assert_eq!(action, KeyAction::Block);
        taps += emitted.iter().filter(|e| e.is_down()).count();
    }
    deliver(&mut engine, &synth, KeyEvent::up(VOLUME_UP));

    assert_eq!(taps, 1);
}

#[test]
fn interleaved_buttons_are_tracked_separately() {
    let (mut engine, _gate, synth) = make_engine(&[(VOLUME_UP, ENTER), (VOLUME_DOWN, RIGHT)]);

    let (_, first) = deliver(&mut engine, &synth, KeyEvent::down(VOLUME_UP));
    let (_, second) = deliver(&mut engine, &synth, KeyEvent::down(VOLUME_DOWN));
    assert_eq!(engine.suppressed_count(), 2);

    assert_eq!(deliver(&mut engine, &synth, KeyEvent::up(VOLUME_UP)).0, KeyAction::Block);
    assert_eq!(deliver(&mut engine, &synth, KeyEvent::up(VOLUME_DOWN)).0, KeyAction::Block);

    assert_eq!(first, vec![KeyEvent::down(ENTER), KeyEvent::up(ENTER)]);
    assert_eq!(second, vec![KeyEvent::down(RIGHT), KeyEvent::up(RIGHT)]);
    assert_eq!(engine.suppressed_count(), 0);
}

#[test]
fn remote_dropping_mid_hold_leaves_no_stuck_key() {
    let (mut engine, gate, synth) = make_engine(&[(VOLUME_UP, ENTER)]);

    deliver(&mut engine, &synth, KeyEvent::down(VOLUME_UP));
    gate.set(false);
    // Repeats after the drop belong to the held key, and so does its release.
    for _ in 0..3 {
        let (action, emitted) = deliver(&mut engine, &synth, KeyEvent::down(VOLUME_UP));
        assert_eq!(action, KeyAction::Block);
        assert!(emitted.is_empty());
    }
    assert_eq!(deliver(&mut engine, &synth, KeyEvent::up(VOLUME_UP)).0, KeyAction::Block);
    assert_eq!(engine.suppressed_count(), 0);

    // A fresh press while disconnected is a plain key.
    assert_eq!(deliver(&mut engine, &synth, KeyEvent::down(VOLUME_UP)).0, KeyAction::Pass);
    assert_eq!(deliver(&mut engine, &synth, KeyEvent::up(VOLUME_UP)).0, KeyAction::Pass);

    gate.set(true);
    let (action, emitted) = deliver(&mut engine, &synth, KeyEvent::down(VOLUME_UP));
    assert_eq!(action, KeyAction::Block);
    assert_eq!(emitted.len(), 2);
}

#[test]
fn disconnected_history_never_matters() {
    let (mut engine, gate, synth) = make_engine(&[(VOLUME_UP, ENTER)]);
    gate.set(false);

    for event in [
        KeyEvent::up(VOLUME_UP),
        KeyEvent::down(VOLUME_UP),
        KeyEvent::down(VOLUME_UP),
        KeyEvent::up(VOLUME_UP),
        KeyEvent::up(VOLUME_UP),
    ] {
        let (action, emitted) = deliver(&mut engine, &synth, event);
        assert_eq!(action, KeyAction::Pass);
        assert!(emitted.is_empty());
    }
}
