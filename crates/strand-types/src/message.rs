use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::did::Did;
use crate::error::ModelError;
use crate::id::{AccountId, MessageId, ThreadId};
use crate::thread::ThreadClass;

/// Recognized message kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Markdown,
    Media,
    Reaction,
    System,
    Email,
}

impl MessageKind {
    pub const ALL: [MessageKind; 6] = [
        Self::Text,
        Self::Markdown,
        Self::Media,
        Self::Reaction,
        Self::System,
        Self::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Media => "media",
            Self::Reaction => "reaction",
            Self::System => "system",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| ModelError::UnknownKind(s.to_string()))
    }
}

/// Who wrote a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub account_id: AccountId,
    pub did: Option<Did>,
}

/// Structural references from a message to its surroundings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct References {
    pub thread_id: ThreadId,
    pub reply_to: Option<MessageId>,
    pub room_id: Option<String>,
    #[serde(default)]
    pub mentions: Vec<AccountId>,
}

/// Where a message was imported from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub platform: String,
    pub native_id: Option<String>,
    pub url: Option<String>,
}

impl Source {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            ..Self::default()
        }
    }
}

/// A stored message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub kind: MessageKind,
    pub content: String,
    pub author: Author,
    /// When the message was written on its origin platform.
    #[serde(with = "crate::time::rfc3339_millis")]
    pub created_at: DateTime<Utc>,
    /// When the message entered this store.
    #[serde(with = "crate::time::rfc3339_millis")]
    pub ingested_at: DateTime<Utc>,
    pub refs: References,
    pub source: Source,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Message {
    /// The fields the message identifier is derived from.
    pub fn identity(&self) -> MessageIdentity {
        MessageIdentity {
            account_id: self.author.account_id,
            content: self.content.clone(),
            created_at: self.created_at,
            kind: self.kind,
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.refs.thread_id
    }
}

/// The identity-bearing subset of a message.
///
/// Canonical JSON of this struct is what gets hashed into the [`MessageId`]
/// and what is stored in the content store under that id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageIdentity {
    pub account_id: AccountId,
    pub content: String,
    #[serde(with = "crate::time::rfc3339_millis")]
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
}

/// Platform-native thread coordinates supplied by an adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHint {
    pub platform: String,
    pub native_id: String,
    pub title: Option<String>,
    #[serde(default)]
    pub class: ThreadClass,
}

impl ThreadHint {
    pub fn new(platform: impl Into<String>, native_id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            native_id: native_id.into(),
            title: None,
            class: ThreadClass::default(),
        }
    }
}

/// Normalized message input produced by an adapter.
///
/// `kind` is kept as free text so that unrecognized kinds surface as a
/// structural error from the store rather than a deserialization failure in
/// the adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInput {
    pub kind: String,
    pub content: String,
    pub account_id: AccountId,
    pub did: Option<Did>,
    pub created_at: DateTime<Utc>,
    pub thread: ThreadHint,
    pub reply_to: Option<MessageId>,
    pub room_id: Option<String>,
    #[serde(default)]
    pub mentions: Vec<AccountId>,
    pub source: Source,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl MessageInput {
    pub fn new(
        kind: impl Into<String>,
        content: impl Into<String>,
        account_id: AccountId,
        created_at: DateTime<Utc>,
        thread: ThreadHint,
    ) -> Self {
        let source = Source::new(thread.platform.clone());
        Self {
            kind: kind.into(),
            content: content.into(),
            account_id,
            did: None,
            created_at,
            thread,
            reply_to: None,
            room_id: None,
            mentions: Vec::new(),
            source,
            tags: BTreeMap::new(),
        }
    }

    pub fn reply_to(mut self, parent: MessageId) -> Self {
        self.reply_to = Some(parent);
        self
    }

    pub fn with_did(mut self, did: Did) -> Self {
        self.did = Some(did);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}
