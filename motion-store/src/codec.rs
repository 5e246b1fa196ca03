//! Pluggable encoding for opaque values written to the store.
//!
//! Spec. §4.1 calls for "a pickle-like codec for opaque values" that's
//! "pluggable; default is the canonical pickle-equivalent opaque encoder."
//! Rust has no runtime-reflective pickle equivalent, so the default codec
//! serializes the already-dynamic [`motion_core::StateMap`] (backed by
//! `serde_json::Value`) through `bincode` — compact and total over any JSON
//! value, mirroring `hitbox_backend::format::BincodeFormat`'s role as the
//! default serialization format in the cache-backend lineage this crate
//! descends from.

use bytes::Bytes;
use motion_core::StateMap;
use thiserror::Error;

/// Error produced while encoding or decoding a value for the store.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The codec could not serialize the value.
    #[error("state codec encode error: {0}")]
    Encode(Box<dyn std::error::Error + Send + Sync>),
    /// The codec could not deserialize the bytes.
    #[error("state codec decode error: {0}")]
    Decode(Box<dyn std::error::Error + Send + Sync>),
}

/// Encodes and decodes the state dictionary to/from opaque bytes.
///
/// Implement this to swap in a different wire format (e.g. JSON for
/// human-inspectable debugging, or a project-specific binary format) without
/// touching the engine or the store adapter.
pub trait StateCodec: Send + Sync {
    /// Serializes a state dictionary to bytes.
    fn encode(&self, state: &StateMap) -> Result<Bytes, CodecError>;
    /// Deserializes bytes back into a state dictionary.
    fn decode(&self, bytes: &[u8]) -> Result<StateMap, CodecError>;
}

/// The default codec: compact binary encoding via `bincode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl StateCodec for BincodeCodec {
    fn encode(&self, state: &StateMap) -> Result<Bytes, CodecError> {
        let json = serde_json::to_vec(state).map_err(|e| CodecError::Encode(Box::new(e)))?;
        let bytes = bincode::encode_to_vec(&json, bincode::config::standard())
            .map_err(|e| CodecError::Encode(Box::new(e)))?;
        Ok(Bytes::from(bytes))
    }

    fn decode(&self, bytes: &[u8]) -> Result<StateMap, CodecError> {
        let (json, _): (Vec<u8>, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| CodecError::Decode(Box::new(e)))?;
        serde_json::from_slice(&json).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}

/// Human-readable codec: plain JSON encoding, useful for debugging or when
/// the store is also inspected by non-Rust tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl StateCodec for JsonCodec {
    fn encode(&self, state: &StateMap) -> Result<Bytes, CodecError> {
        serde_json::to_vec(state)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<StateMap, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> StateMap {
        let mut m = StateMap::new();
        m.insert("value".into(), json!(42));
        m.insert("name".into(), json!("hi"));
        m
    }

    #[test]
    fn bincode_codec_round_trips() {
        let codec = BincodeCodec;
        let state = sample();
        let bytes = codec.encode(&state).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn json_codec_round_trips() {
        let codec = JsonCodec;
        let state = sample();
        let bytes = codec.encode(&state).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, state);
    }
}
