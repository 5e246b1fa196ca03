//! Flow keys and request fingerprints.
//!
//! A [`Fingerprint`] is a deterministic hash of `(flow_key, canonical props)`.
//! It is used both as the cache key (together with the current version) and
//! as the update job identity.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};
use smol_str::SmolStr;

/// The string label pairing a serve route with its update routes.
pub type FlowKey = SmolStr;

/// Raised when `props` cannot be canonicalized for fingerprinting.
///
/// Per the cache's opt-in-bypass rule, this is not surfaced as a dispatch
/// error: callers treat it as "skip the cache for this call".
#[derive(Debug, thiserror::Error)]
#[error("props are not serializable: {0}")]
pub struct CanonicalizeError(#[from] serde_json::Error);

/// A collision-resistant, ≥128-bit hash identifying a `(flow_key, props)` pair.
///
/// Truncated to the first 16 bytes (128 bits) of a SHA-256 digest over the
/// flow key and the canonical JSON encoding of `props`. `serde_json` without
/// the `preserve_order` feature serializes object keys in sorted (`BTreeMap`)
/// order, which is what makes the encoding canonical: two logically equal
/// `props` values always serialize to the same bytes regardless of the order
/// their fields were constructed in.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Computes the fingerprint of `(flow_key, props)`.
    pub fn compute<P: Serialize>(
        flow_key: &str,
        props: &P,
    ) -> Result<Self, CanonicalizeError> {
        let canonical = serde_json::to_vec(props)?;
        let mut hasher = Sha256::new();
        hasher.update(flow_key.as_bytes());
        hasher.update(b"\0");
        hasher.update(&canonical);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Ok(Self(bytes))
    }

    /// Raw 128-bit digest.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", hex::encode(self.0))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_props_same_fingerprint_regardless_of_field_order() {
        let a = json!({"value": 1, "name": "x"});
        let b = json!({"name": "x", "value": 1});
        let fa = Fingerprint::compute("add", &a).unwrap();
        let fb = Fingerprint::compute("add", &b).unwrap();
        assert_eq!(fa, fb);
    }

    #[test]
    fn different_flow_key_different_fingerprint() {
        let props = json!({"v": 1});
        let fa = Fingerprint::compute("add", &props).unwrap();
        let fb = Fingerprint::compute("sub", &props).unwrap();
        assert_ne!(fa, fb);
    }

    #[test]
    fn different_props_different_fingerprint() {
        let fa = Fingerprint::compute("add", &json!({"v": 1})).unwrap();
        let fb = Fingerprint::compute("add", &json!({"v": 2})).unwrap();
        assert_ne!(fa, fb);
    }
}
