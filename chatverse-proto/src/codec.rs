//! Serialization and deserialization for the `ChatVerse` wire protocol.
//!
//! Provides encode/decode functions using JSON, along with length-prefix
//! framing variants for stream-based transports.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Frame is incomplete or has an invalid length prefix.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Encodes a frame into a JSON byte vector.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame cannot be serialized.
pub fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a frame from a JSON byte slice.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a frame with a 4-byte little-endian length prefix.
///
/// Wire format: `[u32 length (LE)][JSON payload bytes]`
///
/// Suitable for stream-based transports (TCP, WebSocket) where message
/// boundaries are not preserved by the transport layer.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame cannot be serialized,
/// or `CodecError::InvalidFrame` if the payload exceeds `u32::MAX` bytes.
pub fn encode_framed<T: Serialize>(frame: &T) -> Result<Vec<u8>, CodecError> {
    let payload = encode(frame)?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        CodecError::InvalidFrame(format!(
            "payload too large for framing: {} bytes",
            payload.len()
        ))
    })?;
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&len.to_le_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Decodes a length-prefixed frame.
///
/// Expects the wire format: `[u32 length (LE)][JSON payload bytes]`
///
/// Returns the decoded frame and the total number of bytes consumed from
/// the input (including the 4-byte length prefix).
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` if the input is too short or the
/// length prefix indicates more data than available, or
/// `CodecError::Serialization` if the payload cannot be deserialized.
pub fn decode_framed<T: DeserializeOwned>(bytes: &[u8]) -> Result<(T, usize), CodecError> {
    if bytes.len() < 4 {
        return Err(CodecError::InvalidFrame(format!(
            "need at least 4 bytes for length prefix, got {}",
            bytes.len()
        )));
    }
    let len_bytes: [u8; 4] = bytes[..4]
        .try_into()
        .map_err(|_| CodecError::InvalidFrame("failed to read length prefix".into()))?;
    let payload_len = u32::from_le_bytes(len_bytes) as usize;

    let total_len = 4 + payload_len;
    if bytes.len() < total_len {
        return Err(CodecError::InvalidFrame(format!(
            "frame indicates {} bytes but only {} available",
            payload_len,
            bytes.len() - 4
        )));
    }

    let frame = decode(&bytes[4..total_len])?;
    Ok((frame, total_len))
}
