//! Codec-level errors for frame reassembly and payload serialization
//!
//! Every variant carries enough context to tell a corrupted stream apart
//! from a misbehaving serializer. None of these errors are recoverable on
//! the same stream: once the header boundary is lost there is no way to
//! find the next packet without out-of-band resynchronization.

use thiserror::Error;

/// Frame parsing and payload errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Header field is not an unsigned decimal integer
    #[error("Malformed {field} field in frame header: {value:?}")]
    InvalidHeaderField { field: &'static str, value: String },

    /// Header is missing the `SEQ` separator between length and sequence
    #[error("Frame header {header:?} is missing the SEQ separator")]
    MissingSeparator { header: String },

    /// No header delimiter found within the widest legal header
    #[error("No ':' delimiter within the first {limit} buffered bytes ({buffered} buffered)")]
    HeaderTooLong { limit: usize, buffered: usize },

    /// Declared payload length exceeds the configured limit
    #[error("Frame too large: {size} bytes exceeds maximum {max} bytes (sequence {sequence})")]
    FrameTooLarge { size: usize, max: usize, sequence: u64 },

    /// Payload does not fit the 32-bit length field
    #[error("Payload of {size} bytes does not fit a u32 length header")]
    PayloadTooLarge { size: usize },

    /// Vector payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Vector payload could not be deserialized
    #[error("Deserialization error: {0} ({1} bytes)")]
    Deserialization(String, usize),
}

impl CodecError {
    /// Create an invalid header field error
    pub fn invalid_field(field: &'static str, raw: &[u8]) -> Self {
        Self::InvalidHeaderField {
            field,
            value: String::from_utf8_lossy(raw).into_owned(),
        }
    }

    /// Check whether the error means the byte stream itself is corrupt
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            CodecError::InvalidHeaderField { .. }
                | CodecError::MissingSeparator { .. }
                | CodecError::HeaderTooLong { .. }
                | CodecError::FrameTooLarge { .. }
        )
    }
}

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;
