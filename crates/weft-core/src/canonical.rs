//! Canonical serialization for signing.
//!
//! Signer and verifier must hash identical bytes. The protocol constant is
//! JSON with lexicographically sorted object keys: values are routed through
//! `serde_json::Value`, whose object map is BTree-backed, so key order is
//! fixed regardless of struct field declaration order. Changing this
//! encoding is a wire-breaking change.

use serde::Serialize;

/// Produce the canonical byte encoding of a value.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_vec(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Forward {
        alpha: u32,
        beta: &'static str,
    }

    #[derive(Serialize)]
    struct Backward {
        beta: &'static str,
        alpha: u32,
    }

    #[test]
    fn field_order_does_not_matter() {
        let a = canonical_bytes(&Forward { alpha: 7, beta: "x" }).unwrap();
        let b = canonical_bytes(&Backward { beta: "x", alpha: 7 }).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn keys_are_sorted() {
        let bytes = canonical_bytes(&Backward { beta: "x", alpha: 7 }).unwrap();
        assert_eq!(bytes, br#"{"alpha":7,"beta":"x"}"#);
    }

    #[test]
    fn deterministic_across_calls() {
        let v = Forward { alpha: 1, beta: "y" };
        assert_eq!(canonical_bytes(&v).unwrap(), canonical_bytes(&v).unwrap());
    }
}
