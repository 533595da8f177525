use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strand_types::{time, Did, Message};
use tracing::error;

use crate::canonical;
use crate::error::{CryptoError, Result};
use crate::hasher;
use crate::identity;
use crate::signer::{Signature, SigningKey};

/// Algorithm tag written into every envelope.
pub const ALGORITHM: &str = "Ed25519";

/// A message together with a detached signature by its author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub message: Message,
    pub signer: Did,
    pub algorithm: String,
    pub signature: Signature,
    #[serde(with = "strand_types::time::rfc3339_millis")]
    pub signed_at: DateTime<Utc>,
}

/// The exact structure whose canonical bytes are signed.
#[derive(Serialize)]
struct SigningPayload<'a> {
    algorithm: &'a str,
    message: &'a Message,
    signer: &'a Did,
    #[serde(with = "strand_types::time::rfc3339_millis")]
    signed_at: DateTime<Utc>,
}

impl SignedEnvelope {
    /// Sign `message` with `key`.
    ///
    /// Refuses to sign a message whose identifier does not match its content.
    pub fn seal(message: Message, key: &SigningKey, signed_at: DateTime<Utc>) -> Result<Self> {
        check_message_id(&message)?;
        let signer = key.did();
        let signed_at = time::normalize(signed_at);
        let payload = canonical::to_bytes(&SigningPayload {
            algorithm: ALGORITHM,
            message: &message,
            signer: &signer,
            signed_at,
        })?;
        let signature = identity::sign(&payload, key);
        Ok(Self {
            message,
            signer,
            algorithm: ALGORITHM.to_string(),
            signature,
            signed_at,
        })
    }

    /// Verify the envelope.
    ///
    /// Recomputes the message identifier, resolves the signer and checks the
    /// signature over the canonical signing payload. Any failure is an error;
    /// there is no partial success.
    pub fn open(&self) -> Result<&Message> {
        if self.algorithm != ALGORITHM {
            return Err(CryptoError::UnsupportedAlgorithm(self.algorithm.clone()));
        }
        check_message_id(&self.message)?;
        let payload = canonical::to_bytes(&SigningPayload {
            algorithm: &self.algorithm,
            message: &self.message,
            signer: &self.signer,
            signed_at: self.signed_at,
        })?;
        identity::verify_strict(&self.signer, &payload, &self.signature).inspect_err(|e| {
            error!(message = %self.message.id, signer = %self.signer, error = %e, "envelope signature invalid");
        })?;
        Ok(&self.message)
    }

    /// `true` if [`open`](Self::open) succeeds.
    pub fn is_valid(&self) -> bool {
        self.open().is_ok()
    }
}

fn check_message_id(message: &Message) -> Result<()> {
    let recomputed = hasher::message_id(&message.identity())?;
    if recomputed != message.id {
        error!(stored = %message.id, recomputed = %recomputed, "message identifier mismatch");
        return Err(CryptoError::IdMismatch {
            stored: message.id.to_string(),
            recomputed: recomputed.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use strand_types::{Author, MessageIdentity, MessageKind, PlatformBinding, References, Source};

    fn message(content: &str) -> Message {
        let account_id = hasher::account_id(&PlatformBinding::new("email", "ada@example.com")).unwrap();
        let created_at = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let id = hasher::message_id(&MessageIdentity {
            account_id,
            content: content.into(),
            created_at,
            kind: MessageKind::Text,
        })
        .unwrap();
        Message {
            id,
            kind: MessageKind::Text,
            content: content.into(),
            author: Author { account_id, did: None },
            created_at,
            ingested_at: created_at,
            refs: References {
                thread_id: hasher::thread_id("email", "t-1").unwrap(),
                reply_to: None,
                room_id: None,
                mentions: vec![],
            },
            source: Source::new("email"),
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn seal_then_open() {
        let key = SigningKey::generate();
        let env = SignedEnvelope::seal(message("hello"), &key, Utc::now()).unwrap();
        assert_eq!(env.algorithm, "Ed25519");
        assert_eq!(env.signer, key.did());
        assert_eq!(env.open().unwrap().content, "hello");
    }

    #[test]
    fn tampered_content_fails_with_id_mismatch() {
        let key = SigningKey::generate();
        let mut env = SignedEnvelope::seal(message("hello"), &key, Utc::now()).unwrap();
        env.message.content = "hell0".into();
        let err = env.open().unwrap_err();
        assert!(matches!(err, CryptoError::IdMismatch { .. }));
        assert_eq!(err.class(), strand_types::ErrorClass::Integrity);
    }

    #[test]
    fn tampered_references_fail_signature() {
        let key = SigningKey::generate();
        let mut env = SignedEnvelope::seal(message("hello"), &key, Utc::now()).unwrap();
        env.message.tags.insert("forged".into(), "yes".into());
        assert_eq!(env.open().unwrap_err(), CryptoError::InvalidSignature);
    }

    #[test]
    fn wrong_signer_fails() {
        let key = SigningKey::generate();
        let mut env = SignedEnvelope::seal(message("hello"), &key, Utc::now()).unwrap();
        env.signer = SigningKey::generate().did();
        assert!(!env.is_valid());
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let key = SigningKey::generate();
        let mut env = SignedEnvelope::seal(message("hello"), &key, Utc::now()).unwrap();
        env.algorithm = "RSA".into();
        assert_eq!(env.open().unwrap_err(), CryptoError::UnsupportedAlgorithm("RSA".into()));
    }

    #[test]
    fn envelope_survives_json_roundtrip() {
        let key = SigningKey::generate();
        let env = SignedEnvelope::seal(message("hello"), &key, Utc::now()).unwrap();
        let json = serde_json::to_string(&env).unwrap();
        let back: SignedEnvelope = serde_json::from_str(&json).unwrap();
        assert!(back.is_valid());
    }

    #[test]
    fn seal_refuses_inconsistent_message() {
        let mut msg = message("hello");
        msg.content = "changed".into();
        assert!(SignedEnvelope::seal(msg, &SigningKey::generate(), Utc::now()).is_err());
    }
}
