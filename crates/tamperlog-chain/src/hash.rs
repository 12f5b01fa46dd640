//! Link digest computation.

use sha2::{Digest, Sha256};
use tamperlog_types::EventLogEntry;

use crate::canonical::canonical_encode;

/// Domain-separation prefix, versioned so the framing can evolve.
const DOMAIN_TAG: &[u8] = b"tamperlog-entry-v1";

/// Computes the link digest of an entry from its chained fields.
///
/// `canonical_payload` must be the output of [`canonical_encode`]. `prev_hash`
/// is `None` only for the genesis entry. Returns 64 lowercase hex characters.
pub fn compute_hash(
    event_type: &str,
    source_app_id: &str,
    canonical_payload: &[u8],
    prev_hash: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_TAG);
    write_field(&mut hasher, event_type.as_bytes());
    write_field(&mut hasher, source_app_id.as_bytes());
    write_field(&mut hasher, canonical_payload);
    match prev_hash {
        None => hasher.update([0u8]),
        Some(prev) => {
            hasher.update([1u8]);
            write_field(&mut hasher, prev.as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Recomputes the digest an entry should carry, from its stored fields.
pub fn entry_hash(entry: &EventLogEntry) -> String {
    compute_hash(
        &entry.event_type,
        &entry.source_app_id,
        &canonical_encode(&entry.data_payload),
        entry.prev_hash.as_deref(),
    )
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Vec<u8> {
        canonical_encode(&value)
    }

    #[test]
    fn digest_is_deterministic_hex_sha256() {
        let p = payload(json!({ "k": "v" }));
        let first = compute_hash("deploy", "ci", &p, None);
        let second = compute_hash("deploy", "ci", &p, None);

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn key_order_does_not_change_digest() {
        let a: serde_json::Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();

        assert_eq!(
            compute_hash("t", "s", &canonical_encode(&a), None),
            compute_hash("t", "s", &canonical_encode(&b), None)
        );
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let p = payload(json!(null));
        assert_ne!(
            compute_hash("ab", "c", &p, None),
            compute_hash("a", "bc", &p, None),
            "shifting bytes between fields must change the digest"
        );
    }

    #[test]
    fn genesis_sentinel_differs_from_empty_prev_hash() {
        let p = payload(json!(1));
        assert_ne!(
            compute_hash("t", "s", &p, None),
            compute_hash("t", "s", &p, Some(""))
        );
    }

    #[test]
    fn every_field_is_committed() {
        let p = payload(json!({ "n": 1 }));
        let base = compute_hash("t", "s", &p, Some("prev"));

        assert_ne!(base, compute_hash("t2", "s", &p, Some("prev")));
        assert_ne!(base, compute_hash("t", "s2", &p, Some("prev")));
        assert_ne!(base, compute_hash("t", "s", &payload(json!({ "n": 2 })), Some("prev")));
        assert_ne!(base, compute_hash("t", "s", &p, Some("prev2")));
    }
}
