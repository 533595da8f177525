use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EventStoreError;

/// Location of a record in the log: segment sequence number and byte offset
/// of the record's line within that segment.
///
/// Positions are totally ordered and serve as resumable replay tokens. The
/// textual token is `"<segment>:<offset>"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub segment: u64,
    pub offset: u64,
}

impl Position {
    pub fn new(segment: u64, offset: u64) -> Self {
        Self { segment, offset }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}

impl FromStr for Position {
    type Err = EventStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EventStoreError::InvalidPosition(s.to_string());
        let (seg, off) = s.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            segment: seg.parse().map_err(|_| invalid())?,
            offset: off.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
