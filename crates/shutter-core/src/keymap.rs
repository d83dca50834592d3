//! INI-style keymap persistence.
//!
//! ```ini
//! [AB Shutter3]
//! VolumeUp=Return
//! Enter=Space
//! ```
//!
//! One section per device, `Source=Target` per line, key names as in
//! [`KeyCode`]'s string form. A `[DEFAULT]` section is ignored. Files may be
//! UTF-8 or UTF-16 (the Windows profile API writes the latter when the file
//! starts with a BOM); writes keep the encoding they found.

use crate::profile::KeymapEntry;
use crate::types::KeyCode;
use encoding_rs::Encoding;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum KeymapError {
    #[error("I/O error accessing keymap at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Durable storage for learned mappings.
pub trait KeymapStore {
    fn load_all(&self) -> Result<Vec<KeymapEntry>, KeymapError>;
    fn write(&mut self, profile: &str, source: KeyCode, target: KeyCode) -> Result<(), KeymapError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedKeymap {
    /// Section names in file order, `DEFAULT` excluded.
    pub sections: Vec<String>,
    pub entries: Vec<KeymapEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileEncoding {
    Utf8 { bom: bool },
    Utf16Le,
    Legacy(&'static Encoding),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniKeymap {
    path: PathBuf,
}

impl IniKeymap {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty keymap.
    pub fn load(&self) -> Result<ParsedKeymap, KeymapError> {
        match self.read_text()? {
            Some((text, _)) => Ok(parse_keymap_content(&text)),
            None => {
                debug!("Keymap {:?} does not exist yet", self.path);
                Ok(ParsedKeymap::default())
            }
        }
    }

    /// The file as text, for showing to the operator.
    pub fn raw_text(&self) -> Result<Option<String>, KeymapError> {
        Ok(self.read_text()?.map(|(text, _)| text))
    }

    fn read_text(&self) -> Result<Option<(String, FileEncoding)>, KeymapError> {
        match fs::read(&self.path) {
            Ok(raw) => {
                let (text, encoding) = decode_keymap_bytes(&raw);
                Ok(Some((text.into_owned(), encoding)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> KeymapError {
        KeymapError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl KeymapStore for IniKeymap {
    fn load_all(&self) -> Result<Vec<KeymapEntry>, KeymapError> {
        self.load().map(|parsed| parsed.entries)
    }

    fn write(&mut self, profile: &str, source: KeyCode, target: KeyCode) -> Result<(), KeymapError> {
        let (text, encoding) = self
            .read_text()?
            .unwrap_or_else(|| (String::new(), FileEncoding::Utf8 { bom: false }));
        let updated = upsert_entry(&text, profile, source, target);

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        // Write-then-rename so a crash never leaves a half-written keymap.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, encode_keymap_text(&updated, encoding)).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        debug!("Wrote [{}] {}={} to {:?}", profile, source, target, self.path);
        Ok(())
    }
}

fn decode_keymap_bytes(raw: &[u8]) -> (Cow<'_, str>, FileEncoding) {
    // 1. Check BOM
    if let Some((enc, bom_len)) = Encoding::for_bom(raw) {
        debug!("Decoded using BOM: {}", enc.name());
        let (cow, had_errors) = enc.decode_without_bom_handling(&raw[bom_len..]);
        if had_errors {
            warn!("Decode had errors (replacement characters used)");
        }
        let encoding = if enc == encoding_rs::UTF_8 {
            FileEncoding::Utf8 { bom: true }
        } else {
            FileEncoding::Utf16Le
        };
        return (cow, encoding);
    }

    // 2. Try UTF-8
    match std::str::from_utf8(raw) {
        Ok(s) => (Cow::Borrowed(s), FileEncoding::Utf8 { bom: false }),
        Err(_) => {
            // 3. Fallback to the ANSI code page
            debug!("UTF-8 decode failed, falling back to windows-1252");
            let (cow, _, _) = encoding_rs::WINDOWS_1252.decode(raw);
            (cow, FileEncoding::Legacy(encoding_rs::WINDOWS_1252))
        }
    }
}

fn encode_keymap_text(text: &str, encoding: FileEncoding) -> Vec<u8> {
    match encoding {
        FileEncoding::Utf8 { bom } => {
            let mut out = Vec::with_capacity(text.len() + 3);
            if bom {
                out.extend_from_slice(b"\xEF\xBB\xBF");
            }
            out.extend_from_slice(text.as_bytes());
            out
        }
        FileEncoding::Utf16Le => {
            let mut out = vec![0xFF, 0xFE];
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            out
        }
        FileEncoding::Legacy(enc) => {
            let (bytes, _, had_errors) = enc.encode(text);
            if had_errors {
                warn!("Keymap text not representable in {}, writing UTF-8", enc.name());
                return encode_keymap_text(text, FileEncoding::Utf8 { bom: true });
            }
            bytes.into_owned()
        }
    }
}

fn section_header(line: &str) -> Option<&str> {
    if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
        Some(line[1..line.len() - 1].trim())
    } else {
        None
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with(';') || line.starts_with('#')
}

fn is_ignored_section(name: &str) -> bool {
    name.is_empty() || name.eq_ignore_ascii_case("DEFAULT")
}

fn strip_quotes(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[0] == bytes[bytes.len() - 1] {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

/// Parses keymap text. Lines that do not form a valid entry are logged and
/// skipped; they never abort the load.
pub fn parse_keymap_content(content: &str) -> ParsedKeymap {
    let mut parsed = ParsedKeymap::default();
    let mut current_section: Option<String> = None;

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || is_comment(line) {
            continue;
        }

        if let Some(name) = section_header(line) {
            if is_ignored_section(name) {
                current_section = None;
                continue;
            }
            let folded = name.to_lowercase();
            if !parsed.sections.iter().any(|s| s.to_lowercase() == folded) {
                parsed.sections.push(name.to_string());
            }
            debug!("Loading map: [{}]", name);
            current_section = Some(name.to_string());
            continue;
        }

        let Some(section) = current_section.as_deref() else {
            debug!("Ignoring line {} outside any section", idx + 1);
            continue;
        };

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            warn!("Cannot parse [{}] line {}: '{}'", section, idx + 1, line);
            continue;
        };
        let raw_key = raw_key.trim();
        let raw_value = strip_quotes(raw_value.trim());

        match (raw_key.parse::<KeyCode>(), raw_value.parse::<KeyCode>()) {
            (Ok(source), Ok(target)) => {
                parsed.entries.push(KeymapEntry::new(section, source, target));
            }
            _ => warn!("Cannot parse [{}] '{}'='{}'", section, raw_key, raw_value),
        }
    }

    parsed
}

fn line_key_matches(line: &str, source: KeyCode) -> bool {
    let line = line.trim();
    if is_comment(line) {
        return false;
    }
    match line.split_once('=') {
        Some((raw_key, _)) => {
            let raw_key = raw_key.trim();
            raw_key.parse::<KeyCode>().map(|k| k == source).unwrap_or(false)
                || raw_key.eq_ignore_ascii_case(&source.to_string())
        }
        None => false,
    }
}

/// Sets `source=target` under `[profile]`, keeping every other line as is.
/// A repeated `[profile]` header is part of the same profile, so the key is
/// cleared from every copy. Creates the section at the end when missing.
fn upsert_entry(content: &str, profile: &str, source: KeyCode, target: KeyCode) -> String {
    let eol = if content.contains("\r\n") || (content.is_empty() && cfg!(windows)) {
        "\r\n"
    } else {
        "\n"
    };
    let entry_line = format!("{}={}", source, target);
    let wanted = profile.to_lowercase();

    let mut lines: Vec<String> = Vec::new();
    let mut in_profile = false;
    let mut in_first_copy = false;
    // Just past the last non-blank line of the first `[profile]` copy.
    let mut insert_at: Option<usize> = None;
    let mut replaced = false;

    for line in content.lines() {
        if let Some(name) = section_header(line.trim()) {
            in_profile = name.to_lowercase() == wanted;
            in_first_copy = in_profile && insert_at.is_none();
            lines.push(line.to_string());
            if in_first_copy {
                insert_at = Some(lines.len());
            }
            continue;
        }

        if in_profile && line_key_matches(line, source) {
            if replaced {
                // Stale duplicate; the loader would prefer it.
                continue;
            }
            lines.push(entry_line.clone());
            replaced = true;
        } else {
            lines.push(line.to_string());
        }
        if in_first_copy && !line.trim().is_empty() {
            insert_at = Some(lines.len());
        }
    }

    match insert_at {
        Some(_) if replaced => {}
        Some(at) => lines.insert(at, entry_line),
        None => {
            if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(format!("[{}]", profile));
            lines.push(entry_line);
        }
    }

    let mut out = lines.join(eol);
    out.push_str(eol);
    out
}
