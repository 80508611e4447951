//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the bytes were wrong, never the socket.
//! The session layer logs these and keeps the connection open.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, a missing `payload`, or a known
    /// `type` tag whose fields have the wrong shape.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but breaks a protocol rule, e.g. an empty
    /// user id.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
