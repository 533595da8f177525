//! `did:key` identity engine.
//!
//! Identities are self-certifying: the identity string embeds the public key,
//! so resolution never leaves the process.

use strand_types::Did;
use tracing::debug;

use crate::error::Result;
use crate::signer::{Signature, SigningKey, VerifyingKey};

/// Generate a fresh keypair and its identity.
pub fn generate() -> (Did, SigningKey) {
    let key = SigningKey::generate();
    (key.did(), key)
}

/// Resolve an identity to its verifying key.
///
/// Fails if the embedded bytes are not a valid Ed25519 point.
pub fn resolve(did: &Did) -> Result<VerifyingKey> {
    VerifyingKey::from_bytes(*did.public_key())
}

/// Parse and resolve an identity string.
pub fn resolve_str(text: &str) -> Result<VerifyingKey> {
    let did = Did::parse(text)?;
    resolve(&did)
}

pub fn sign(payload: &[u8], key: &SigningKey) -> Signature {
    key.sign(payload)
}

/// Verify `signature` over `payload` by the holder of `did`.
///
/// Every failure, including an unresolvable identity, is reported as `false`.
pub fn verify(did: &Did, payload: &[u8], signature: &Signature) -> bool {
    verify_strict(did, payload, signature).is_ok()
}

/// Like [`verify`] but keeps the reason for failure.
pub fn verify_strict(did: &Did, payload: &[u8], signature: &Signature) -> Result<()> {
    let key = resolve(did)?;
    let outcome = key.verify(payload, signature);
    if outcome.is_err() {
        debug!(signer = %did, "signature rejected");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;
    use proptest::prelude::*;

    #[test]
    fn generated_identity_resolves_to_its_key() {
        let (did, key) = generate();
        assert_eq!(resolve(&did).unwrap(), key.verifying_key());
        assert_eq!(resolve_str(&did.to_string()).unwrap(), key.verifying_key());
    }

    #[test]
    fn resolve_str_reports_structural_errors() {
        let err = resolve_str("did:web:example.com").unwrap_err();
        assert!(matches!(err, CryptoError::Did(_)));
        assert_eq!(err.class(), strand_types::ErrorClass::Structural);
    }

    #[test]
    fn verify_fails_closed_for_other_signer() {
        let (_, key) = generate();
        let (other, _) = generate();
        let sig = sign(b"payload", &key);
        assert!(!verify(&other, b"payload", &sig));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn signature_law(
            payload in proptest::collection::vec(any::<u8>(), 1..128),
            flip_index in any::<usize>(),
            bit in 0u8..8,
        ) {
            let key = SigningKey::from_bytes([11u8; 32]);
            let did = key.did();
            let sig = sign(&payload, &key);
            prop_assert!(verify(&did, &payload, &sig));

            let mut tampered = payload.clone();
            let i = flip_index % tampered.len();
            tampered[i] ^= 1 << bit;
            prop_assert!(!verify(&did, &tampered, &sig));

            let mut sig_bytes = sig.to_bytes();
            let j = flip_index % sig_bytes.len();
            sig_bytes[j] ^= 1 << bit;
            let bad_sig = Signature::from_slice(&sig_bytes).unwrap();
            prop_assert!(!verify(&did, &payload, &bad_sig));
        }
    }
}
