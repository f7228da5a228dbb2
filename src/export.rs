//! Reader for PuTTY registry exports (`.reg` files).
//!
//! Only the subset of the registry format PuTTY writes for its saved sessions is
//! understood: session key headers and `"Name"=value` lines below them.

use std::{fs, path::Path, sync::OnceLock};

use encoding_rs::{UTF_16LE, UTF_8};
use regex::Regex;

use crate::error::{Error, Result};
use crate::session::{Session, Sessions};

const DWORD_PREFIX: &str = "dword:";

fn session_header() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\[HKEY_CURRENT_USER\\Software\\[^\\\]]+\\PuTTY\\Sessions\\(.+?)\]$")
            .expect("session header pattern is valid")
    })
}

/// Reads and parses the export at `path`.
///
/// A missing file is reported as [`Error::ExportNotFound`] rather than an empty result.
pub fn parse_export(path: &Path) -> Result<Sessions> {
    if !path.is_file() {
        return Err(Error::ExportNotFound(path.to_path_buf()));
    }

    let bytes = fs::read(path).map_err(|source| Error::ExportRead {
        path: path.to_path_buf(),
        source,
    })?;
    let sessions = parse_str(&decode(&bytes));
    tracing::debug!(path = %path.display(), count = sessions.len(), "parsed export");

    Ok(sessions)
}

/// Decodes the raw export. regedit writes UTF-16LE; anything that does not look like it
/// is read as UTF-8 with undecodable sequences replaced.
pub fn decode(bytes: &[u8]) -> String {
    let content = match decode_utf16le(bytes) {
        Some(text) => text,
        None => UTF_8.decode_with_bom_removal(bytes).0.into_owned(),
    };

    content
        .replace("\r\n", "\n")
        .trim_start_matches('\u{feff}')
        .to_string()
}

fn decode_utf16le(bytes: &[u8]) -> Option<String> {
    // ASCII text in UTF-16LE always has zero high bytes; without any the input is 8-bit.
    let has_zero_high_byte = bytes.chunks_exact(2).any(|pair| pair[1] == 0);
    if bytes.len() % 2 != 0 || !has_zero_high_byte {
        return None;
    }

    // Bad code units become U+FFFD instead of discarding the whole file.
    Some(UTF_16LE.decode_with_bom_removal(bytes).0.into_owned())
}

/// Parses decoded export text. Never fails: unrecognised lines are skipped.
///
/// A repeated session header keeps accumulating into the existing entry, so later
/// values overwrite earlier ones key by key.
pub fn parse_str(content: &str) -> Sessions {
    let (sessions, _) = content.lines().map(str::trim).filter(|l| !l.is_empty()).fold(
        (Sessions::new(), None::<String>),
        |(mut sessions, current), line| {
            if let Some(caps) = session_header().captures(line) {
                let name = caps[1].trim().to_string();
                sessions.entry(name.clone()).or_insert_with(Session::new);
                return (sessions, Some(name));
            }

            if let (Some(name), Some((key, value))) = (current.as_deref(), parse_property(line)) {
                if let Some(session) = sessions.get_mut(name) {
                    session.set(key, value);
                }
            }

            (sessions, current)
        },
    );

    sessions
}

/// Splits a `"Key"=value` line into the key and its decoded value.
fn parse_property(line: &str) -> Option<(&str, String)> {
    let rest = line.strip_prefix('"')?;
    let (key, raw) = rest.split_once("\"=")?;
    let raw = raw.trim();
    if key.is_empty() || key.contains('"') || raw.is_empty() {
        return None;
    }

    Some((key.trim(), decode_value(raw)))
}

fn decode_value(raw: &str) -> String {
    if let Some(quoted) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        quoted.replace("\\\\", "\\")
    } else if let Some(hex) = raw.strip_prefix(DWORD_PREFIX) {
        u64::from_str_radix(hex.trim(), 16)
            .map(|n| n.to_string())
            .unwrap_or_else(|_| "0".to_string())
    } else {
        raw.to_string()
    }
}
