//! Vector payload serialization
//!
//! Vectors travel as bincode-encoded `Vec<f64>`. The frame codec never looks
//! inside a payload; only the two ends of the link call into this module.

use crate::error::{CodecError, CodecResult};
use bytes::Bytes;

/// Serialize one vector into an opaque payload
pub fn encode_vector(values: &[f64]) -> CodecResult<Bytes> {
    bincode::serialize(values)
        .map(Bytes::from)
        .map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Deserialize a payload produced by [`encode_vector`]
pub fn decode_vector(payload: &[u8]) -> CodecResult<Vec<f64>> {
    bincode::deserialize(payload)
        .map_err(|e| CodecError::Deserialization(e.to_string(), payload.len()))
}
