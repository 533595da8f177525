//! Canonical JSON.
//!
//! Object keys are emitted in lexicographic order and no insignificant
//! whitespace is written. Both identifier derivation and signing go through
//! [`to_bytes`]; nothing else in Strand serializes hashed or signed data.

use serde::Serialize;

use crate::error::{CryptoError, Result};

/// Serialize `value` into canonical JSON bytes.
pub fn to_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    // Round-tripping through `Value` re-sorts every object: `serde_json::Map`
    // is ordered by key.
    let value = to_value(value)?;
    serde_json::to_vec(&value).map_err(|e| CryptoError::Serialization(e.to_string()))
}

/// Serialize into a key-sorted JSON value.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| CryptoError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Unordered {
        zeta: u32,
        alpha: &'static str,
        nested: Nested,
    }

    #[derive(Serialize)]
    struct Nested {
        y: bool,
        b: Vec<u8>,
    }

    #[test]
    fn keys_are_sorted_recursively() {
        let v = Unordered {
            zeta: 1,
            alpha: "a",
            nested: Nested { y: true, b: vec![1, 2] },
        };
        let bytes = to_bytes(&v).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"alpha":"a","nested":{"b":[1,2],"y":true},"zeta":1}"#
        );
    }

    #[test]
    fn map_insertion_order_does_not_matter() {
        let mut a = HashMap::new();
        let mut b = HashMap::new();
        for (k, v) in [("one", 1), ("two", 2), ("three", 3), ("four", 4)] {
            a.insert(k, v);
        }
        for (k, v) in [("four", 4), ("three", 3), ("two", 2), ("one", 1)] {
            b.insert(k, v);
        }
        assert_eq!(to_bytes(&a).unwrap(), to_bytes(&b).unwrap());
    }

    #[test]
    fn non_string_map_keys_fail() {
        let mut m = HashMap::new();
        m.insert(vec![1u8], 1);
        assert!(matches!(to_bytes(&m), Err(CryptoError::Serialization(_))));
    }
}
