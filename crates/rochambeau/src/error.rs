//! Unified error type for the Rochambeau client.

use rochambeau_play::PlayError;
use rochambeau_protocol::ProtocolError;
use rochambeau_session::SessionError;
use rochambeau_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors, so callers of the `rochambeau` meta-crate handle one type.
#[derive(Debug, thiserror::Error)]
pub enum RochambeauError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (not connected, retries exhausted).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A queue or game rule was broken (move out of turn, already queued).
    #[error(transparent)]
    Play(#[from] PlayError),

    /// The operation belongs to the other screen.
    #[error("{operation} is not available on the {screen} screen")]
    WrongScreen {
        operation: &'static str,
        screen: &'static str,
    },
}
