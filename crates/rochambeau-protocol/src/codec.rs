//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The session layer never calls `serde_json` directly; it holds a
//! [`Codec`] and asks it to turn envelopes into frames and back. That keeps
//! the wire format swappable and lets tests assert on raw frames.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a codec lives inside the session's
/// driver task, which Tokio may move between worker threads.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that speaks JSON, the format both servers use.
///
/// Behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use rochambeau_protocol::{Codec, Envelope, GameRequest, JsonCodec, Move, UserId};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::new(
///     Some(UserId::from("u1")),
///     GameRequest::Move { value: Move::Rock },
/// );
///
/// let bytes = codec.encode(&envelope).unwrap();
/// assert_eq!(
///     std::str::from_utf8(&bytes).unwrap(),
///     r#"{"userId":"u1","payload":{"type":"Move","value":"rock"}}"#
/// );
///
/// let decoded: Envelope<GameRequest> = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Envelope, MatchmakingResponse};

    #[test]
    fn test_json_codec_decode_reports_decode_error() {
        let result: Result<Envelope<MatchmakingResponse>, _> =
            JsonCodec.decode(b"{\"userId\":");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_encode_unit_payload_as_null() {
        let bytes = JsonCodec.encode(&Envelope::announce(None)).unwrap();
        assert_eq!(bytes, br#"{"userId":null,"payload":null}"#);
    }
}
