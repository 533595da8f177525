use crate::error::IdentifierError;

/// Supported multibase encodings.
///
/// The first character of a multibase string selects the encoding of the
/// remainder. Strand emits base58btc by default and accepts lowercase base16
/// for debugging and interop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Multibase {
    /// `z`: Bitcoin-alphabet base58.
    #[default]
    Base58Btc,
    /// `f`: lowercase hexadecimal.
    Base16Lower,
}

impl Multibase {
    /// The multibase prefix character.
    pub fn code(&self) -> char {
        match self {
            Self::Base58Btc => 'z',
            Self::Base16Lower => 'f',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'z' => Some(Self::Base58Btc),
            'f' => Some(Self::Base16Lower),
            _ => None,
        }
    }

    /// Encode bytes, prefixed with this encoding's code character.
    pub fn encode(&self, bytes: &[u8]) -> String {
        let body = match self {
            Self::Base58Btc => bs58::encode(bytes).into_string(),
            Self::Base16Lower => hex::encode(bytes),
        };
        let mut out = String::with_capacity(body.len() + 1);
        out.push(self.code());
        out.push_str(&body);
        out
    }

    /// Decode a prefixed multibase string.
    pub fn decode(input: &str) -> Result<(Self, Vec<u8>), IdentifierError> {
        let mut chars = input.chars();
        let code = chars.next().ok_or(IdentifierError::EmptyPayload)?;
        let base = Self::from_code(code).ok_or(IdentifierError::UnsupportedMultibase(code))?;
        let body = chars.as_str();
        if body.is_empty() {
            return Err(IdentifierError::EmptyPayload);
        }
        let bytes = match base {
            Self::Base58Btc => bs58::decode(body)
                .into_vec()
                .map_err(|e| IdentifierError::InvalidEncoding(e.to_string()))?,
            Self::Base16Lower => {
                if body.chars().any(|c| c.is_ascii_uppercase()) {
                    return Err(IdentifierError::InvalidEncoding(
                        "base16 payload must be lowercase".into(),
                    ));
                }
                hex::decode(body).map_err(|e| IdentifierError::InvalidEncoding(e.to_string()))?
            }
        };
        Ok((base, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn base58_has_z_prefix() {
        let s = Multibase::Base58Btc.encode(b"hello");
        assert!(s.starts_with('z'));
    }

    #[test]
    fn base16_has_f_prefix() {
        assert_eq!(Multibase::Base16Lower.encode(&[0xab, 0x01]), "fab01");
    }

    #[test]
    fn unknown_prefix_is_rejected() {
        assert_eq!(
            Multibase::decode("mAAAA"),
            Err(IdentifierError::UnsupportedMultibase('m'))
        );
    }

    #[test]
    fn invalid_alphabet_is_rejected() {
        // '0' is not in the base58btc alphabet.
        assert!(matches!(
            Multibase::decode("z0000"),
            Err(IdentifierError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn uppercase_hex_is_rejected() {
        assert!(Multibase::decode("fABCD").is_err());
    }

    #[test]
    fn empty_body_is_rejected() {
        assert_eq!(Multibase::decode("z"), Err(IdentifierError::EmptyPayload));
        assert_eq!(Multibase::decode(""), Err(IdentifierError::EmptyPayload));
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(bytes in proptest::collection::vec(any::<u8>(), 1..96)) {
            for base in [Multibase::Base58Btc, Multibase::Base16Lower] {
                let text = base.encode(&bytes);
                let (decoded_base, decoded) = Multibase::decode(&text).unwrap();
                prop_assert_eq!(decoded_base, base);
                prop_assert_eq!(&decoded, &bytes);
            }
        }
    }
}
