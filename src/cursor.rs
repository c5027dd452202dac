use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};

const PREFIX: &str = "arrayconnection:";

/// An opaque pagination position. Round-trips to a zero-based offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub offset: usize,
}

impl Cursor {
    pub fn new(offset: usize) -> Self {
        Self { offset }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD.encode(format!("{PREFIX}{}", self.offset)))
    }
}

impl FromStr for Cursor {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let bytes = STANDARD
            .decode(input)
            .map_err(|_| "Failed to decode cursor, error 1".to_string())?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| "Failed to decode cursor, error 2".to_string())?;
        let offset = text
            .strip_prefix(PREFIX)
            .ok_or_else(|| "Failed to decode cursor, error 3".to_string())?;
        offset
            .parse::<usize>()
            .map(Cursor::new)
            .map_err(|_| "Failed to decode cursor, error 4".to_string())
    }
}

pub fn offset_to_cursor(offset: usize) -> String {
    Cursor::new(offset).to_string()
}

/// Decodes a cursor, `None` for anything that is not a cursor this codec produced
pub fn cursor_to_offset(cursor: &str) -> Option<usize> {
    cursor.parse::<Cursor>().ok().map(|c| c.offset)
}

/// Offset of `cursor`, or `default` when the cursor is absent or undecodable.
///
/// Offsets must leave room for the position after them, so `i64::MAX` is rejected.
pub fn get_offset_with_default(cursor: Option<&str>, default: i64) -> i64 {
    cursor
        .and_then(cursor_to_offset)
        .and_then(|offset| i64::try_from(offset).ok())
        .filter(|offset| *offset < i64::MAX)
        .unwrap_or(default)
}

/// Relay global id, `base64("Type:value")`
pub fn to_global_id(type_name: &str, value: &serde_json::Value) -> String {
    let value = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    STANDARD.encode(format!("{type_name}:{value}"))
}

/// Splits a global id back into its type name and raw value
pub fn from_global_id(id: &str) -> Option<(String, String)> {
    let bytes = STANDARD.decode(id).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let (type_name, value) = text.split_once(':')?;
    if type_name.is_empty() {
        return None;
    }
    Some((type_name.to_string(), value.to_string()))
}
