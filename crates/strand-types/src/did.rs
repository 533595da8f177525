use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DidError;
use crate::varint;

/// Multicodec code for an Ed25519 public key.
pub const ED25519_PUB_CODE: u64 = 0xed;

const PREFIX: &str = "did:key:";

/// Self-certifying `did:key` identity.
///
/// The identity string is `did:key:z<base58btc(0xed 0x01 || public key)>`.
/// Resolution is a pure decode: no network lookup is ever needed. This type
/// only carries the raw key bytes; turning them into a verifying key (and
/// rejecting points that are not on the curve) happens in `strand-crypto`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Did {
    key: [u8; 32],
}

impl Did {
    pub fn from_public_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Raw Ed25519 public key bytes.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.key
    }

    /// The multibase-encoded, multicodec-tagged key after `did:key:`.
    pub fn method_specific_id(&self) -> String {
        let mut tagged = Vec::with_capacity(34);
        varint::encode(ED25519_PUB_CODE, &mut tagged);
        tagged.extend_from_slice(&self.key);
        format!("z{}", bs58::encode(tagged).into_string())
    }

    pub fn parse(text: &str) -> Result<Self, DidError> {
        let rest = text.strip_prefix("did:").ok_or(DidError::MissingScheme)?;
        let (method, msid) = rest.split_once(':').unwrap_or((rest, ""));
        if method != "key" {
            return Err(DidError::UnsupportedMethod(method.to_string()));
        }

        let mut chars = msid.chars();
        match chars.next() {
            Some('z') => {}
            other => return Err(DidError::UnsupportedMultibase(other)),
        }
        let tagged = bs58::decode(chars.as_str())
            .into_vec()
            .map_err(|e| DidError::InvalidEncoding(e.to_string()))?;

        let (code, used) =
            varint::decode(&tagged).map_err(|e| DidError::InvalidEncoding(e.to_string()))?;
        if code != ED25519_PUB_CODE {
            return Err(DidError::UnsupportedKeyType(code));
        }
        let key_bytes = &tagged[used..];
        let key: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| DidError::InvalidKeyLength(key_bytes.len()))?;
        Ok(Self { key })
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.method_specific_id())
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self)
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_did_starts_with_z6mk() {
        // Every Ed25519 did:key begins with z6Mk because of the 0xed01 tag.
        let did = Did::from_public_key([42u8; 32]);
        assert!(did.to_string().starts_with("did:key:z6Mk"));
    }

    #[test]
    fn parse_inverts_display() {
        let did = Did::from_public_key([9u8; 32]);
        let parsed: Did = did.to_string().parse().unwrap();
        assert_eq!(parsed, did);
        assert_eq!(parsed.public_key(), &[9u8; 32]);
    }

    #[test]
    fn known_vector_decodes() {
        let did = Did::parse("did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK").unwrap();
        assert_eq!(
            hex::encode(did.public_key()),
            "2e6fcce36701dc791488e0d0b1745cc1e33a4c1c9fcc41c63bd343dbbe0970e6"
        );
    }

    #[test]
    fn structural_failures() {
        assert_eq!(Did::parse("key:z6Mk"), Err(DidError::MissingScheme));
        assert_eq!(
            Did::parse("did:web:example.com"),
            Err(DidError::UnsupportedMethod("web".into()))
        );
        assert_eq!(
            Did::parse("did:key:f00"),
            Err(DidError::UnsupportedMultibase(Some('f')))
        );
        assert_eq!(Did::parse("did:key:"), Err(DidError::UnsupportedMultibase(None)));
        assert!(matches!(
            Did::parse("did:key:z0OIl"),
            Err(DidError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn wrong_key_type_and_length() {
        let mut tagged = Vec::new();
        varint::encode(0xe7, &mut tagged); // secp256k1-pub
        tagged.extend_from_slice(&[1u8; 33]);
        let text = format!("did:key:z{}", bs58::encode(&tagged).into_string());
        assert_eq!(Did::parse(&text), Err(DidError::UnsupportedKeyType(0xe7)));

        let mut tagged = Vec::new();
        varint::encode(ED25519_PUB_CODE, &mut tagged);
        tagged.extend_from_slice(&[1u8; 31]);
        let text = format!("did:key:z{}", bs58::encode(&tagged).into_string());
        assert_eq!(Did::parse(&text), Err(DidError::InvalidKeyLength(31)));
    }

    #[test]
    fn serde_as_string() {
        let did = Did::from_public_key([3u8; 32]);
        let json = serde_json::to_string(&did).unwrap();
        assert!(json.starts_with("\"did:key:z6Mk"));
        let back: Did = serde_json::from_str(&json).unwrap();
        assert_eq!(back, did);
    }
}
