use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IdentifierError;
use crate::multibase::Multibase;
use crate::varint;

/// Multihash code for BLAKE3.
pub const BLAKE3_CODE: u64 = 0x1e;
/// Digest length in bytes for every identifier.
pub const DIGEST_LEN: usize = 32;
/// Version tag of the self-describing profile.
pub const SELF_DESCRIBING_VERSION: u64 = 1;

const SEPARATOR: char = '_';

/// Identifier namespace.
///
/// The namespace is part of the textual form (`msg_…`, `evt_…`) and selects
/// the hashing domain, so equal bytes in two namespaces never collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Message,
    Event,
    Account,
    Thread,
    Blob,
}

impl Namespace {
    pub const ALL: [Namespace; 5] = [
        Self::Message,
        Self::Event,
        Self::Account,
        Self::Thread,
        Self::Blob,
    ];

    /// Textual prefix used before the separator.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Message => "msg",
            Self::Event => "evt",
            Self::Account => "acct",
            Self::Thread => "thr",
            Self::Blob => "blob",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.prefix() == prefix)
    }

    /// Domain tag mixed into the digest of identifiers in this namespace.
    pub fn domain(&self) -> &'static str {
        match self {
            Self::Message => "strand-message-v1",
            Self::Event => "strand-event-v1",
            Self::Account => "strand-account-v1",
            Self::Thread => "strand-thread-v1",
            Self::Blob => "strand-blob-v1",
        }
    }

    /// Binary profile used when identifiers in this namespace are minted.
    pub fn default_profile(&self) -> Profile {
        match self {
            Self::Message => Profile::SelfDescribing,
            _ => Profile::Compact,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Binary layout of an identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Profile {
    /// Bare 32-byte digest.
    Compact,
    /// `varint(version) varint(codec) varint(hash) varint(len) digest`.
    SelfDescribing,
}

/// Content-type tag carried by self-describing identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Codec {
    Raw,
    DagJson,
}

impl Codec {
    pub fn code(&self) -> u64 {
        match self {
            Self::Raw => 0x55,
            Self::DagJson => 0x0129,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x55 => Some(Self::Raw),
            0x0129 => Some(Self::DagJson),
            _ => None,
        }
    }
}

/// Content-derived identifier.
///
/// Equality and ordering are defined over the canonical binary form together
/// with the namespace. Compact identifiers always carry [`Codec::Raw`] since
/// their binary form has no room for a content type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    namespace: Namespace,
    profile: Profile,
    codec: Codec,
    digest: [u8; DIGEST_LEN],
}

impl Identifier {
    /// Wrap a precomputed digest.
    pub fn from_digest(
        namespace: Namespace,
        profile: Profile,
        codec: Codec,
        digest: [u8; DIGEST_LEN],
    ) -> Self {
        let codec = match profile {
            Profile::Compact => Codec::Raw,
            Profile::SelfDescribing => codec,
        };
        Self {
            namespace,
            profile,
            codec,
            digest,
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Lowercase hex of the digest, used for filesystem sharding.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// First eight hex characters of the digest.
    pub fn short(&self) -> String {
        hex::encode(&self.digest[..4])
    }

    /// Canonical binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.profile {
            Profile::Compact => self.digest.to_vec(),
            Profile::SelfDescribing => {
                let mut out = Vec::with_capacity(DIGEST_LEN + 6);
                varint::encode(SELF_DESCRIBING_VERSION, &mut out);
                varint::encode(self.codec.code(), &mut out);
                varint::encode(BLAKE3_CODE, &mut out);
                varint::encode(DIGEST_LEN as u64, &mut out);
                out.extend_from_slice(&self.digest);
                out
            }
        }
    }

    /// Parse the canonical binary form within a known namespace.
    pub fn from_bytes(namespace: Namespace, bytes: &[u8]) -> Result<Self, IdentifierError> {
        if bytes.len() == DIGEST_LEN {
            let mut digest = [0u8; DIGEST_LEN];
            digest.copy_from_slice(bytes);
            return Ok(Self::from_digest(namespace, Profile::Compact, Codec::Raw, digest));
        }

        let mut rest = bytes;
        let mut next = || -> Result<u64, IdentifierError> {
            let (value, used) = varint::decode(rest)?;
            rest = &rest[used..];
            Ok(value)
        };

        let version = next()?;
        if version != SELF_DESCRIBING_VERSION {
            return Err(IdentifierError::UnsupportedVersion(version));
        }
        let codec_code = next()?;
        let codec = Codec::from_code(codec_code)
            .ok_or(IdentifierError::UnsupportedCodec(codec_code))?;
        let hash_code = next()?;
        if hash_code != BLAKE3_CODE {
            return Err(IdentifierError::UnsupportedHash(hash_code));
        }
        let declared = next()? as usize;
        if declared != DIGEST_LEN || rest.len() != DIGEST_LEN {
            return Err(IdentifierError::InvalidLength {
                expected: DIGEST_LEN,
                actual: if declared != DIGEST_LEN { declared } else { rest.len() },
            });
        }

        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(rest);
        Ok(Self::from_digest(namespace, Profile::SelfDescribing, codec, digest))
    }

    /// Textual form with the given multibase encoding.
    pub fn encode(&self, base: Multibase) -> String {
        format!(
            "{}{}{}",
            self.namespace.prefix(),
            SEPARATOR,
            base.encode(&self.to_bytes())
        )
    }

    /// Textual form with the default (base58btc) encoding.
    pub fn to_text(&self) -> String {
        self.encode(Multibase::default())
    }

    /// Parse the textual form `<namespace>_<multibase payload>`.
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        let (prefix, payload) = text
            .split_once(SEPARATOR)
            .ok_or(IdentifierError::MissingSeparator)?;
        let namespace = Namespace::from_prefix(prefix)
            .ok_or_else(|| IdentifierError::UnknownNamespace(prefix.to_string()))?;
        let (_, bytes) = Multibase::decode(payload)?;
        Self::from_bytes(namespace, &bytes)
    }

    /// Parse and require a namespace.
    pub fn parse_in(namespace: Namespace, text: &str) -> Result<Self, IdentifierError> {
        let id = Self::parse(text)?;
        if id.namespace != namespace {
            return Err(IdentifierError::NamespaceMismatch {
                expected: namespace,
                actual: id.namespace,
            });
        }
        Ok(id)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({}:{})", self.namespace, self.short())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

macro_rules! namespaced_id {
    ($(#[$meta:meta])* $name:ident => $ns:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Identifier);

        impl $name {
            pub const NAMESPACE: Namespace = $ns;

            /// Wrap an identifier, rejecting other namespaces.
            pub fn new(id: Identifier) -> Result<Self, IdentifierError> {
                if id.namespace() != Self::NAMESPACE {
                    return Err(IdentifierError::NamespaceMismatch {
                        expected: Self::NAMESPACE,
                        actual: id.namespace(),
                    });
                }
                Ok(Self(id))
            }

            pub fn parse(text: &str) -> Result<Self, IdentifierError> {
                Identifier::parse_in(Self::NAMESPACE, text).map(Self)
            }

            pub fn as_identifier(&self) -> &Identifier {
                &self.0
            }

            pub fn short(&self) -> String {
                self.0.short()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0.short())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<$name> for Identifier {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl TryFrom<Identifier> for $name {
            type Error = IdentifierError;

            fn try_from(id: Identifier) -> Result<Self, Self::Error> {
                Self::new(id)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let id = Identifier::deserialize(deserializer)?;
                Self::new(id).map_err(serde::de::Error::custom)
            }
        }
    };
}

namespaced_id!(
    /// Identifier of a message, derived from its canonical identity fields.
    MessageId => Namespace::Message
);
namespaced_id!(
    /// Identifier of an event, derived from every other event field.
    EventId => Namespace::Event
);
namespaced_id!(
    /// Local account identifier.
    AccountId => Namespace::Account
);
namespaced_id!(
    /// Conversation thread identifier.
    ThreadId => Namespace::Thread
);
namespaced_id!(
    /// Identifier of an opaque content blob.
    BlobId => Namespace::Blob
);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(ns: Namespace, byte: u8) -> Identifier {
        Identifier::from_digest(ns, ns.default_profile(), Codec::DagJson, [byte; DIGEST_LEN])
    }

    #[test]
    fn compact_binary_is_bare_digest() {
        let id = sample(Namespace::Event, 7);
        assert_eq!(id.profile(), Profile::Compact);
        assert_eq!(id.to_bytes(), vec![7u8; 32]);
        assert_eq!(id.codec(), Codec::Raw);
    }

    #[test]
    fn self_describing_binary_has_header() {
        let id = sample(Namespace::Message, 1);
        let bytes = id.to_bytes();
        // version, dag-json (2 bytes), blake3, length, digest
        assert_eq!(&bytes[..5], &[0x01, 0xa9, 0x02, 0x1e, 0x20]);
        assert_eq!(bytes.len(), 37);
    }

    #[test]
    fn textual_form_has_namespace_and_multibase() {
        let id = sample(Namespace::Message, 3);
        let text = id.to_text();
        assert!(text.starts_with("msg_z"));
        let hex = id.encode(Multibase::Base16Lower);
        assert!(hex.starts_with("msg_f01a902"));
    }

    #[test]
    fn parse_both_encodings() {
        let id = sample(Namespace::Thread, 9);
        assert_eq!(Identifier::parse(&id.to_text()).unwrap(), id);
        assert_eq!(
            Identifier::parse(&id.encode(Multibase::Base16Lower)).unwrap(),
            id
        );
    }

    #[test]
    fn structural_errors_are_distinguished() {
        assert_eq!(
            Identifier::parse("nonsense"),
            Err(IdentifierError::MissingSeparator)
        );
        assert_eq!(
            Identifier::parse("usr_zabc"),
            Err(IdentifierError::UnknownNamespace("usr".into()))
        );
        assert_eq!(
            Identifier::parse("msg_qabc"),
            Err(IdentifierError::UnsupportedMultibase('q'))
        );
        let err = Identifier::parse("evt_f0102").unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn unsupported_header_fields_are_rejected() {
        let id = sample(Namespace::Message, 4);
        let mut bytes = id.to_bytes();
        bytes[0] = 0x02;
        assert_eq!(
            Identifier::from_bytes(Namespace::Message, &bytes),
            Err(IdentifierError::UnsupportedVersion(2))
        );

        let mut bytes = id.to_bytes();
        bytes[3] = 0x12; // sha2-256
        assert_eq!(
            Identifier::from_bytes(Namespace::Message, &bytes),
            Err(IdentifierError::UnsupportedHash(0x12))
        );

        let mut bytes = id.to_bytes();
        bytes.pop();
        assert!(matches!(
            Identifier::from_bytes(Namespace::Message, &bytes),
            Err(IdentifierError::InvalidLength { .. })
        ));
    }

    #[test]
    fn typed_ids_check_namespace() {
        let event = sample(Namespace::Event, 5);
        let err = MessageId::new(event).unwrap_err();
        assert_eq!(
            err,
            IdentifierError::NamespaceMismatch {
                expected: Namespace::Message,
                actual: Namespace::Event,
            }
        );
        assert!(EventId::new(event).is_ok());
        assert!(MessageId::parse(&event.to_text()).is_err());
    }

    #[test]
    fn serde_uses_text_form() {
        let id = MessageId::new(sample(Namespace::Message, 6)).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn serde_rejects_wrong_namespace() {
        let json = format!("\"{}\"", sample(Namespace::Account, 1));
        assert!(serde_json::from_str::<ThreadId>(&json).is_err());
    }

    proptest! {
        #[test]
        fn parse_encode_parse_is_lossless(
            digest in proptest::array::uniform32(any::<u8>()),
            ns_index in 0usize..5,
            self_describing in any::<bool>(),
            hex in any::<bool>(),
        ) {
            let ns = Namespace::ALL[ns_index];
            let profile = if self_describing { Profile::SelfDescribing } else { Profile::Compact };
            let id = Identifier::from_digest(ns, profile, Codec::DagJson, digest);
            let base = if hex { Multibase::Base16Lower } else { Multibase::Base58Btc };
            let parsed = Identifier::parse(&id.encode(base)).unwrap();
            prop_assert_eq!(parsed, id);
            let reparsed = Identifier::parse(&parsed.to_text()).unwrap();
            prop_assert_eq!(reparsed, id);
        }
    }
}
