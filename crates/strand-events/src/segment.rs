//! Segment files and crash-recovery scanning.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::framing::{self, Frame, FrameError};

/// Segment file name: `<seq, 8 digits>-<YYYYMMDD>.log`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentName {
    pub seq: u64,
    pub day: NaiveDate,
}

impl SegmentName {
    pub fn new(seq: u64, day: NaiveDate) -> Self {
        Self { seq, day }
    }

    pub fn file_name(&self) -> String {
        format!("{:08}-{}.log", self.seq, self.day.format("%Y%m%d"))
    }

    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".log")?;
        let (seq, day) = stem.split_once('-')?;
        if seq.len() != 8 || day.len() != 8 {
            return None;
        }
        Some(Self {
            seq: seq.parse().ok()?,
            day: NaiveDate::parse_from_str(day, "%Y%m%d").ok()?,
        })
    }
}

/// All segments in `dir`, ordered by sequence number.
pub fn list_segments(dir: &Path) -> io::Result<Vec<(SegmentName, PathBuf)>> {
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(parsed) = name.to_str().and_then(SegmentName::parse) {
            segments.push((parsed, entry.path()));
        }
    }
    segments.sort_by_key(|(name, _)| name.seq);
    Ok(segments)
}

/// A committed record and the byte offset of its line.
#[derive(Clone, Debug)]
pub struct ScannedRecord {
    pub offset: u64,
    pub frame: Frame,
}

/// How a scan ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tail {
    /// Every byte belongs to a committed batch.
    Clean,
    /// Trailing bytes after the last committed batch are damaged or
    /// incomplete and nothing valid follows: a torn write, safe to discard.
    Torn { offset: u64, reason: String },
    /// A damaged record is followed by at least one intact record.
    Corrupt { offset: u64, reason: String },
    /// A record was written by a newer schema.
    UnsupportedSchema { offset: u64, version: u32 },
}

/// Result of scanning one segment.
#[derive(Clone, Debug)]
pub struct SegmentScan {
    /// Records of committed batches only.
    pub records: Vec<ScannedRecord>,
    /// Byte length covered by committed batches.
    pub committed_len: u64,
    pub tail: Tail,
}

/// Scan segment bytes front to back.
pub fn scan(bytes: &[u8]) -> SegmentScan {
    let mut records = Vec::new();
    let mut pending: Vec<ScannedRecord> = Vec::new();
    let mut committed_len = 0u64;
    let mut tail = Tail::Clean;
    let mut offset = 0usize;

    while offset < bytes.len() {
        let Some(nl) = bytes[offset..].iter().position(|b| *b == b'\n') else {
            tail = Tail::Torn {
                offset: offset as u64,
                reason: "incomplete record".to_string(),
            };
            break;
        };
        let end = offset + nl + 1;

        let failure = match decode_line(&bytes[offset..offset + nl]) {
            Ok(frame) => {
                let in_sequence = match pending.first() {
                    None => frame.index == 1,
                    Some(first) => {
                        frame.total == first.frame.total && frame.index as usize == pending.len() + 1
                    }
                };
                if in_sequence {
                    let closes = frame.closes_batch();
                    pending.push(ScannedRecord {
                        offset: offset as u64,
                        frame,
                    });
                    if closes {
                        records.append(&mut pending);
                        committed_len = end as u64;
                    }
                    None
                } else {
                    Some(FrameError::Malformed("record out of batch sequence"))
                }
            }
            Err(e) => Some(e),
        };

        if let Some(err) = failure {
            tail = match err {
                FrameError::UnsupportedSchema(version) => Tail::UnsupportedSchema {
                    offset: offset as u64,
                    version,
                },
                other if valid_record_follows(&bytes[end..]) => Tail::Corrupt {
                    offset: offset as u64,
                    reason: other.to_string(),
                },
                other => Tail::Torn {
                    offset: offset as u64,
                    reason: other.to_string(),
                },
            };
            break;
        }
        offset = end;
    }

    if tail == Tail::Clean {
        if let Some(first) = pending.first() {
            tail = Tail::Torn {
                offset: first.offset,
                reason: "incomplete batch".to_string(),
            };
        }
    }

    SegmentScan {
        records,
        committed_len,
        tail,
    }
}

fn decode_line(line: &[u8]) -> Result<Frame, FrameError> {
    let text = std::str::from_utf8(line).map_err(|_| FrameError::Malformed("not utf-8"))?;
    framing::decode(text)
}

fn valid_record_follows(bytes: &[u8]) -> bool {
    bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .any(|line| decode_line(line).is_ok())
}
