//! Protocol encoding/decoding
//!
//! Pure, stateless translation between wire lines and typed replies.
//!
//! Line formats (newline-terminated, ASCII/UTF-8):
//! - `?` — request a full table dump (size + all entries)
//! - `#` — request the table size only
//! - `<index>=<value>` — write `value` to slot `index` (1-based)
//! - `Number of strings: <N>` — device announces table size
//! - `String read from position <P>=<V>` — device reports slot contents

use super::DecodeError;

/// Fixed reply prefixes emitted by the device firmware
const SIZE_PREFIX: &str = "Number of strings:";
const ENTRY_PREFIX: &str = "String read from position";

/// A decoded device reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceReply {
    /// Device announced its table size; the mirror table is rebuilt
    SizeAnnounced(usize),

    /// Device reported the contents of one slot
    EntryRead {
        /// 1-based slot position
        position: usize,
        /// Slot contents, verbatim (may contain `=`)
        value: String,
    },

    /// Free-form diagnostic line with no table effect
    Unrecognized(String),
}

/// Encode a full-table discovery request
pub fn encode_discovery_request() -> &'static str {
    "?"
}

/// Encode a size-only query
pub fn encode_count_request() -> &'static str {
    "#"
}

/// Encode a slot write.
///
/// The value is passed through unescaped: the wire protocol has no
/// escaping, so a value containing `=` or a newline is ambiguous on the
/// device side. This is a protocol constraint, not something to fix here.
pub fn encode_write(index: usize, value: &str) -> String {
    format!("{}={}", index, value)
}

/// Pass-through for free-form custom commands
pub fn encode_raw(text: &str) -> &str {
    text
}

/// Decode one newline-stripped reply line.
///
/// Prefixes are checked in fixed order: size announcement, then entry
/// read, then unrecognized. A line matching no known prefix is never an
/// error; it is forwarded for logging.
pub fn decode_line(line: &str) -> Result<DeviceReply, DecodeError> {
    if let Some(rest) = line.strip_prefix(SIZE_PREFIX) {
        let n = rest
            .trim()
            .parse::<usize>()
            .map_err(|_| DecodeError::MalformedSize(line.to_string()))?;
        return Ok(DeviceReply::SizeAnnounced(n));
    }

    if let Some(rest) = line.strip_prefix(ENTRY_PREFIX) {
        // Position is everything before the first '=' after the prefix.
        // The firmware emits `position <P>=<V>`; tolerate `<P> = <V>` by
        // trimming the position and stripping one leading space from the
        // value. Everything past that is verbatim and may contain '='.
        let (pos_text, value) = rest
            .split_once('=')
            .ok_or_else(|| DecodeError::MalformedEntry(line.to_string()))?;
        let position = pos_text
            .trim()
            .parse::<usize>()
            .map_err(|_| DecodeError::MalformedEntry(line.to_string()))?;
        let value = value.strip_prefix(' ').unwrap_or(value);
        return Ok(DeviceReply::EntryRead {
            position,
            value: value.to_string(),
        });
    }

    Ok(DeviceReply::Unrecognized(line.to_string()))
}
