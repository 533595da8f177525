//! Line framing for event records.
//!
//! ```text
//! <crc32 of json, 8 lowercase hex> <index>/<batch size> <event json>\n
//! ```
//!
//! `index` is 1-based. A batch is committed once its record with
//! `index == batch size` is fully written; readers never surface records of
//! an uncommitted batch.

use crate::error::{EventStoreError, Result};
use crate::event::{Event, SCHEMA_VERSION};

/// A decoded record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub index: u32,
    pub total: u32,
    pub event: Event,
}

impl Frame {
    pub fn closes_batch(&self) -> bool {
        self.index == self.total
    }
}

/// Why a line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    #[error("checksum mismatch: header {expected:08x}, computed {actual:08x}")]
    Checksum { expected: u32, actual: u32 },

    #[error("unparsable event: {0}")]
    Json(String),

    #[error("event id does not match its content")]
    IdMismatch,

    #[error("unsupported schema version {0}")]
    UnsupportedSchema(u32),
}

/// Encode one record, including the trailing newline.
pub fn encode(index: u32, total: u32, event: &Event) -> Result<String> {
    let json =
        serde_json::to_string(event).map_err(|e| EventStoreError::Serialization(e.to_string()))?;
    let crc = crc32fast::hash(json.as_bytes());
    Ok(format!("{crc:08x} {index}/{total} {json}\n"))
}

/// Encode a batch as one contiguous buffer.
pub fn encode_batch(events: &[Event]) -> Result<String> {
    let total = events.len() as u32;
    let mut out = String::new();
    for (i, event) in events.iter().enumerate() {
        out.push_str(&encode(i as u32 + 1, total, event)?);
    }
    Ok(out)
}

/// Decode one line (without its newline).
pub fn decode(line: &str) -> std::result::Result<Frame, FrameError> {
    let (crc_hex, rest) = line.split_once(' ').ok_or(FrameError::Malformed("missing checksum"))?;
    let (seq, json) = rest.split_once(' ').ok_or(FrameError::Malformed("missing batch marker"))?;
    if crc_hex.len() != 8 {
        return Err(FrameError::Malformed("checksum must be 8 hex digits"));
    }
    let expected =
        u32::from_str_radix(crc_hex, 16).map_err(|_| FrameError::Malformed("checksum is not hex"))?;
    let (index, total) = seq.split_once('/').ok_or(FrameError::Malformed("bad batch marker"))?;
    let index: u32 = index.parse().map_err(|_| FrameError::Malformed("bad batch index"))?;
    let total: u32 = total.parse().map_err(|_| FrameError::Malformed("bad batch size"))?;
    if index == 0 || index > total {
        return Err(FrameError::Malformed("batch index out of range"));
    }

    let actual = crc32fast::hash(json.as_bytes());
    if actual != expected {
        return Err(FrameError::Checksum { expected, actual });
    }

    let event: Event = serde_json::from_str(json).map_err(|e| FrameError::Json(e.to_string()))?;
    if event.schema_version > SCHEMA_VERSION {
        return Err(FrameError::UnsupportedSchema(event.schema_version));
    }
    if event.verify_id().is_err() {
        return Err(FrameError::IdMismatch);
    }
    Ok(Frame {
        index,
        total,
        event,
    })
}
