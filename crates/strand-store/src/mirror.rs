//! Human-readable content mirror files.
//!
//! A mirror is a plain-text rendering of one message: `Key: value` header
//! lines, a delimiter line, then the raw body. Mirrors are write-only
//! conveniences for people and external tools; the store never reads them
//! back as a source of truth.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use strand_types::{Message, MessageId};
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};

/// Line separating the header block from the body.
pub const MIRROR_DELIMITER: &str = "--- strand-body ---";

/// Parsed or to-be-rendered mirror document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorDocument {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MirrorDocument {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Append a header. Line breaks in the value are flattened to spaces.
    pub fn header(mut self, key: impl Into<String>, value: impl AsRef<str>) -> Self {
        let value = value.as_ref().replace(['\r', '\n'], " ");
        self.headers.push((key.into(), value));
        self
    }

    /// First header value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Standard rendering of a stored message.
    pub fn for_message(message: &Message) -> Self {
        let mut doc = Self::new(message.content.clone())
            .header("Id", message.id.to_string())
            .header("Kind", message.kind.as_str())
            .header("Account", message.author.account_id.to_string());
        if let Some(did) = &message.author.did {
            doc = doc.header("Did", did.to_string());
        }
        doc = doc
            .header("Thread", message.refs.thread_id.to_string())
            .header("Created-At", strand_types::time::format(&message.created_at))
            .header("Ingested-At", strand_types::time::format(&message.ingested_at))
            .header("Platform", &message.source.platform);
        if let Some(parent) = &message.refs.reply_to {
            doc = doc.header("Reply-To", parent.to_string());
        }
        if let Some(native) = &message.source.native_id {
            doc = doc.header("Native-Id", native);
        }
        if let Some(url) = &message.source.url {
            doc = doc.header("Url", url);
        }
        for (k, v) in &message.tags {
            doc = doc.header("Tag", format!("{k}={v}"));
        }
        doc
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.headers {
            out.push_str(k);
            out.push_str(": ");
            out.push_str(v);
            out.push('\n');
        }
        out.push_str(MIRROR_DELIMITER);
        out.push('\n');
        out.push_str(&self.body);
        out
    }

    pub fn parse(text: &str) -> StoreResult<Self> {
        let mut headers = Vec::new();
        let mut rest = text;
        loop {
            let (line, tail) = match rest.split_once('\n') {
                Some(split) => split,
                None => {
                    return Err(StoreError::InvalidMirror(
                        "missing body delimiter".to_string(),
                    ))
                }
            };
            rest = tail;
            if line == MIRROR_DELIMITER {
                break;
            }
            let (k, v) = line
                .split_once(": ")
                .ok_or_else(|| StoreError::InvalidMirror(format!("bad header line: {line:?}")))?;
            headers.push((k.to_string(), v.to_string()));
        }
        Ok(Self {
            headers,
            body: rest.to_string(),
        })
    }

    /// Atomically write the rendered document to `path`.
    pub fn write_to(&self, path: &Path) -> StoreResult<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(self.render().as_bytes())?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

/// Conventional mirror location: `<root>/mirror/<2 hex>/<digest hex>.txt`.
pub fn mirror_path(root: &Path, id: &MessageId) -> PathBuf {
    let hex = id.as_identifier().digest_hex();
    root.join("mirror").join(&hex[..2]).join(format!("{hex}.txt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_then_parse() {
        let doc = MirrorDocument::new("line one\nline two\n")
            .header("Id", "msg_zabc")
            .header("Kind", "text");
        let text = doc.render();
        assert!(text.contains("\n--- strand-body ---\nline one"));
        assert_eq!(MirrorDocument::parse(&text).unwrap(), doc);
    }

    #[test]
    fn body_may_contain_delimiter_like_text() {
        let body = format!("before\n{MIRROR_DELIMITER}\nafter");
        let doc = MirrorDocument::new(body.clone()).header("Id", "x");
        let parsed = MirrorDocument::parse(&doc.render()).unwrap();
        assert_eq!(parsed.body, body);
    }

    #[test]
    fn header_values_are_single_line() {
        let doc = MirrorDocument::new("").header("Title", "a\nb");
        assert_eq!(doc.get("Title"), Some("a b"));
        assert_eq!(MirrorDocument::parse(&doc.render()).unwrap(), doc);
    }

    #[test]
    fn missing_delimiter_is_rejected() {
        assert!(matches!(
            MirrorDocument::parse("Id: x\nno delimiter"),
            Err(StoreError::InvalidMirror(_))
        ));
        assert!(MirrorDocument::parse("garbage line\n--- strand-body ---\n").is_err());
    }

    #[test]
    fn write_to_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/doc.txt");
        let doc = MirrorDocument::new("body").header("K", "v");
        doc.write_to(&path).unwrap();
        let back = MirrorDocument::parse(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, doc);
    }
}
