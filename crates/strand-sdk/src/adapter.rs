//! Normalization of platform records into [`MessageInput`].
//!
//! The set of source formats is closed: chat exports, email and direct API
//! submissions. Each variant knows how to describe itself as a message
//! input; the store never parses platform-native formats.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strand_crypto::hasher;
use strand_types::{
    Did, MessageId, MessageInput, MessageKind, PlatformBinding, Source, ThreadClass, ThreadHint,
};

use crate::error::{SdkError, SdkResult};

pub trait ToMessageInput {
    fn to_message_input(&self) -> SdkResult<MessageInput>;
}

/// One line of a chat export (Slack, Matrix, Discord and the like).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub platform: String,
    pub channel: String,
    pub channel_name: Option<String>,
    /// Whether the channel is a one-to-one conversation.
    #[serde(default)]
    pub direct: bool,
    pub native_id: Option<String>,
    pub sender: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    /// Parent message, already resolved to its Strand id.
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub markdown: bool,
    pub permalink: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// The `Message-ID` header.
    pub message_id: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub date: DateTime<Utc>,
    pub in_reply_to: Option<MessageId>,
    /// Root `Message-ID` of the conversation, from the `References` header.
    pub thread_root: Option<String>,
}

impl EmailRecord {
    /// Subject without reply/forward prefixes, lowercased.
    pub fn normalized_subject(&self) -> String {
        let mut subject = self.subject.trim();
        loop {
            let lower = subject.to_ascii_lowercase();
            let stripped = ["re:", "fwd:", "fw:"]
                .iter()
                .find(|p| lower.starts_with(*p))
                .map(|p| subject[p.len()..].trim_start());
            match stripped {
                Some(rest) => subject = rest,
                None => break,
            }
        }
        subject.to_lowercase()
    }
}

/// A message submitted directly through an API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRecord {
    pub kind: String,
    pub content: String,
    pub author: PlatformBinding,
    pub did: Option<Did>,
    pub thread: ThreadHint,
    pub created_at: DateTime<Utc>,
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Every supported source format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourceRecord {
    Chat(ChatRecord),
    Email(EmailRecord),
    Api(ApiRecord),
}

impl ToMessageInput for ChatRecord {
    fn to_message_input(&self) -> SdkResult<MessageInput> {
        let author = hasher::account_id(&PlatformBinding::new(&self.platform, &self.sender))?;
        let kind = if self.markdown {
            MessageKind::Markdown
        } else {
            MessageKind::Text
        };
        let mut thread = ThreadHint::new(&self.platform, &self.channel);
        thread.title = self.channel_name.clone();
        thread.class = if self.direct {
            ThreadClass::Direct
        } else {
            ThreadClass::Channel
        };

        let mut input = MessageInput::new(kind.as_str(), &self.text, author, self.sent_at, thread);
        input.reply_to = self.reply_to;
        input.source = Source {
            platform: self.platform.clone(),
            native_id: self.native_id.clone(),
            url: self.permalink.clone(),
        };
        Ok(input)
    }
}

impl ToMessageInput for EmailRecord {
    fn to_message_input(&self) -> SdkResult<MessageInput> {
        let from = self.from.trim().to_ascii_lowercase();
        if from.is_empty() {
            return Err(SdkError::InvalidInput("email has no sender".into()));
        }
        let author = hasher::account_id(&PlatformBinding::new("email", &from))?;
        let native_thread = match &self.thread_root {
            Some(root) => root.clone(),
            None => format!("subject:{}", self.normalized_subject()),
        };
        let mut thread = ThreadHint::new("email", native_thread);
        thread.title = Some(self.subject.trim().to_string()).filter(|s| !s.is_empty());
        thread.class = ThreadClass::Topic;

        let mut input =
            MessageInput::new(MessageKind::Email.as_str(), &self.body, author, self.date, thread)
                .with_tag("subject", self.subject.trim());
        input.reply_to = self.in_reply_to;
        input.source.native_id = Some(self.message_id.clone());
        Ok(input)
    }
}

impl ToMessageInput for ApiRecord {
    fn to_message_input(&self) -> SdkResult<MessageInput> {
        let author = hasher::account_id(&self.author)?;
        let mut input = MessageInput::new(
            &self.kind,
            &self.content,
            author,
            self.created_at,
            self.thread.clone(),
        );
        input.did = self.did.clone();
        input.reply_to = self.reply_to;
        input.tags = self.tags.clone();
        input.source = Source::new("api");
        Ok(input)
    }
}

impl ToMessageInput for SourceRecord {
    fn to_message_input(&self) -> SdkResult<MessageInput> {
        match self {
            Self::Chat(record) => record.to_message_input(),
            Self::Email(record) => record.to_message_input(),
            Self::Api(record) => record.to_message_input(),
        }
    }
}
