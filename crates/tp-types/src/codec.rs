//! # Codec
//!
//! Byte-level encoding for envelopes and payloads.

use crate::message::MessageType;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while encoding or decoding protocol data.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The bytes did not decode into the expected type.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The envelope carried a different payload than the caller expected.
    #[error("unexpected message type: expected {expected}, got {actual}")]
    UnexpectedMessageType {
        expected: MessageType,
        actual: MessageType,
    },
}

/// Serialize a value to bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Deserialize a value from bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
