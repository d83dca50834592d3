use shutter_core::keymap::KeymapError;
use shutter_core::training::TrainingNotice;
use shutter_core::MappingTable;

const NEXT_PROMPT: &str = "\nPress next button on REMOTE or ESC to exit...";

pub fn render_notice(notice: &TrainingNotice) -> String {
    match notice {
        TrainingNotice::SourceCaptured(source) => {
            format!("\nINPUT> {}. Press TARGET keyboard key...", source)
        }
        TrainingNotice::Mapped { source, target } => {
            format!("MAP>   {} -> {}\n{}", source, target, NEXT_PROMPT)
        }
        TrainingNotice::ModifierRejected(key) => format!(
            "\nERROR: Modifier key ({}) cannot be a target. Start over.\n{}",
            key, NEXT_PROMPT
        ),
        TrainingNotice::PersistFailed {
            source,
            target,
            reason,
        } => format!(
            "\nERROR: Could not save {} -> {}: {}\n{}",
            source, target, reason, NEXT_PROMPT
        ),
        TrainingNotice::Closed => "ESC pressed, ending training.".to_string(),
    }
}

/// In-memory table for the trained profile, loaded entries included.
pub fn render_learned(profile: &str, table: &MappingTable) -> String {
    let mut out = format!("--- Current map: [{}] ---", profile);
    for (source, target) in table.iter() {
        out.push_str(&format!("\n{} -> {}", source, target));
    }
    out
}

/// Final view of the keymap file, printed when training ends.
pub fn render_keymap_dump(text: Result<Option<String>, KeymapError>) -> String {
    let body = match text {
        Ok(Some(text)) => text,
        _ => "(INI not found/readable)".to_string(),
    };
    format!(
        "--- Mappings in INI ---\n{}\n----------------------",
        body.trim_end()
    )
}
