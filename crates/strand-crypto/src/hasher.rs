use serde::Serialize;
use strand_types::{
    AccountId, BlobId, Codec, Identifier, IdentifierError, MessageId, MessageIdentity, Namespace,
    PlatformBinding, Profile, ThreadId,
};

use crate::canonical;
use crate::error::Result;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher is bound to one identifier namespace whose domain tag (e.g.
/// `"strand-message-v1"`) is prepended to every hash computation. Identical
/// bytes hashed in two namespaces never produce the same digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentHasher {
    namespace: Namespace,
}

impl ContentHasher {
    pub const MESSAGE: Self = Self::new(Namespace::Message);
    pub const EVENT: Self = Self::new(Namespace::Event);
    pub const ACCOUNT: Self = Self::new(Namespace::Account);
    pub const THREAD: Self = Self::new(Namespace::Thread);
    pub const BLOB: Self = Self::new(Namespace::Blob);

    pub const fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }

    /// Raw 32-byte domain-separated digest.
    pub fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.namespace.domain().as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Identifier of `data` in this hasher's namespace with an explicit profile.
    pub fn identify(&self, profile: Profile, codec: Codec, data: &[u8]) -> Identifier {
        Identifier::from_digest(self.namespace, profile, codec, self.digest(data))
    }

    /// Identifier of `data` using the namespace's default profile.
    pub fn hash(&self, data: &[u8]) -> Identifier {
        self.identify(self.namespace.default_profile(), Codec::DagJson, data)
    }

    /// Hash the canonical JSON form of `value`.
    pub fn hash_canonical<T: Serialize + ?Sized>(&self, value: &T) -> Result<Identifier> {
        Ok(self.hash(&canonical::to_bytes(value)?))
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }
}

/// Derive an identifier for `bytes`.
pub fn identify(namespace: Namespace, profile: Profile, bytes: &[u8]) -> Identifier {
    ContentHasher::new(namespace).identify(profile, Codec::DagJson, bytes)
}

/// Recompute `id` from `bytes` and compare.
pub fn verify(id: &Identifier, bytes: &[u8]) -> bool {
    ContentHasher::new(id.namespace()).identify(id.profile(), id.codec(), bytes) == *id
}

/// Like [`verify`], but returns a content-mismatch error on failure.
pub fn verify_strict(id: &Identifier, bytes: &[u8]) -> std::result::Result<(), IdentifierError> {
    if verify(id, bytes) {
        Ok(())
    } else {
        Err(IdentifierError::ContentMismatch(id.to_string()))
    }
}

/// Canonical bytes of a message's identity fields.
///
/// These bytes are both the hash input for the [`MessageId`] and the object
/// kept in the content store.
pub fn message_identity_bytes(identity: &MessageIdentity) -> Result<Vec<u8>> {
    canonical::to_bytes(identity)
}

pub fn message_id(identity: &MessageIdentity) -> Result<MessageId> {
    let id = ContentHasher::MESSAGE.hash(&message_identity_bytes(identity)?);
    Ok(MessageId::new(id)?)
}

/// Account identifiers are derived from the account's first platform binding.
pub fn account_id(binding: &PlatformBinding) -> Result<AccountId> {
    let id = ContentHasher::ACCOUNT.hash_canonical(binding)?;
    Ok(AccountId::new(id)?)
}

#[derive(Serialize)]
struct ThreadKey<'a> {
    platform: &'a str,
    native_id: &'a str,
}

/// Thread identifiers are derived from the platform and its native thread id.
pub fn thread_id(platform: &str, native_id: &str) -> Result<ThreadId> {
    let id = ContentHasher::THREAD.hash_canonical(&ThreadKey { platform, native_id })?;
    Ok(ThreadId::new(id)?)
}

pub fn blob_id(bytes: &[u8]) -> Result<BlobId> {
    Ok(BlobId::new(ContentHasher::BLOB.hash(bytes))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use strand_types::MessageKind;

    fn identity(content: &str) -> MessageIdentity {
        MessageIdentity {
            account_id: account_id(&PlatformBinding::new("email", "ada@example.com")).unwrap(),
            content: content.into(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            kind: MessageKind::Text,
        }
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(ContentHasher::BLOB.hash(b"x"), ContentHasher::BLOB.hash(b"x"));
    }

    #[test]
    fn namespaces_separate_domains() {
        let a = ContentHasher::BLOB.digest(b"same");
        let b = ContentHasher::EVENT.digest(b"same");
        assert_ne!(a, b);
        assert_ne!(a, *blake3::hash(b"same").as_bytes());
    }

    #[test]
    fn message_ids_are_self_describing() {
        let id = message_id(&identity("hello")).unwrap();
        assert_eq!(id.as_identifier().profile(), Profile::SelfDescribing);
        assert_eq!(id.as_identifier().codec(), Codec::DagJson);
        assert!(id.to_string().starts_with("msg_z"));
    }

    #[test]
    fn message_id_covers_every_identity_field() {
        let base = message_id(&identity("hello")).unwrap();
        let mut other = identity("hello");
        other.kind = MessageKind::Markdown;
        assert_ne!(message_id(&other).unwrap(), base);

        let mut other = identity("hello");
        other.created_at = other.created_at + chrono::Duration::milliseconds(1);
        assert_ne!(message_id(&other).unwrap(), base);

        assert_ne!(message_id(&identity("hello!")).unwrap(), base);
    }

    #[test]
    fn sub_millisecond_differences_do_not_change_ids() {
        let mut a = identity("hi");
        let mut b = identity("hi");
        a.created_at = a.created_at + chrono::Duration::nanoseconds(100);
        b.created_at = b.created_at + chrono::Duration::nanoseconds(900);
        assert_eq!(message_id(&a).unwrap(), message_id(&b).unwrap());
    }

    #[test]
    fn verify_detects_single_byte_change() {
        let bytes = message_identity_bytes(&identity("hello")).unwrap();
        let id = message_id(&identity("hello")).unwrap();
        assert!(verify(id.as_identifier(), &bytes));

        let mut tampered = bytes.clone();
        tampered[10] ^= 0x01;
        assert!(!verify(id.as_identifier(), &tampered));
        let err = verify_strict(id.as_identifier(), &tampered).unwrap_err();
        assert!(matches!(err, IdentifierError::ContentMismatch(_)));
        assert!(!err.is_structural());
    }

    #[test]
    fn thread_ids_depend_on_platform() {
        assert_ne!(
            thread_id("slack", "C1").unwrap(),
            thread_id("discord", "C1").unwrap()
        );
        assert_eq!(thread_id("slack", "C1").unwrap(), thread_id("slack", "C1").unwrap());
    }

    proptest! {
        #[test]
        fn identical_identity_yields_identical_id(content in ".{1,64}", millis in 0i64..4_000_000_000_000) {
            let ts = Utc.timestamp_millis_opt(millis).unwrap();
            let make = || MessageIdentity {
                account_id: account_id(&PlatformBinding::new("p", "h")).unwrap(),
                content: content.clone(),
                created_at: ts,
                kind: MessageKind::Text,
            };
            prop_assert_eq!(message_id(&make()).unwrap(), message_id(&make()).unwrap());
        }

        #[test]
        fn verify_accepts_own_bytes(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let id = ContentHasher::BLOB.hash(&data);
            prop_assert!(verify(&id, &data));
        }
    }
}
