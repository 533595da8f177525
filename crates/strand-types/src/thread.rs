use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::id::{AccountId, ThreadId};

/// Conversation shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadClass {
    Direct,
    #[default]
    Group,
    Channel,
    Topic,
}

impl ThreadClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Channel => "channel",
            Self::Topic => "topic",
        }
    }
}

impl fmt::Display for ThreadClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreadClass {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "group" => Ok(Self::Group),
            "channel" => Ok(Self::Channel),
            "topic" => Ok(Self::Topic),
            _ => Err(ModelError::UnknownThreadClass(s.to_string())),
        }
    }
}

/// A conversation thread.
///
/// `message_count` and `last_activity` are derived by projections and are
/// never authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub title: Option<String>,
    pub participants: BTreeSet<AccountId>,
    pub class: ThreadClass,
    /// Platform the thread originates from.
    pub platform: String,
    /// Platform-native thread identifier.
    pub native_id: String,
    pub message_count: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Offset/limit window over an ordered listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Pagination {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Everything, in one page.
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: usize::MAX,
        }
    }

    /// Apply the window to an ordered iterator.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_class_parses_case_insensitively() {
        assert_eq!("Direct".parse::<ThreadClass>().unwrap(), ThreadClass::Direct);
        assert_eq!(
            "forum".parse::<ThreadClass>(),
            Err(ModelError::UnknownThreadClass("forum".into()))
        );
    }

    #[test]
    fn pagination_windows() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(Pagination::new(2, 3).apply(items.clone()), vec![2, 3, 4]);
        assert_eq!(Pagination::new(8, 5).apply(items.clone()), vec![8, 9]);
        assert!(Pagination::new(20, 5).apply(items.clone()).is_empty());
        assert_eq!(Pagination::all().apply(items).len(), 10);
    }
}
