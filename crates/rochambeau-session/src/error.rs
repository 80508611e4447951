//! Error types for the session layer.

use rochambeau_protocol::ProtocolError;
use rochambeau_transport::{CloseReason, TransportError};

use crate::ConnectionState;

/// Errors that can occur while driving a session.
///
/// Only [`SendWhileDisconnected`](Self::SendWhileDisconnected) is ever
/// returned to a caller. Everything else happens inside the driver task
/// and is surfaced through [`Session::last_error`](crate::Session::last_error)
/// alongside the [`ConnectionState`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The socket failed to open, send, or receive.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The socket closed without a clean normal-closure handshake.
    #[error("connection closed abnormally: {0}")]
    AbnormalClosure(CloseReason),

    /// `send` was called outside the Connected state. Nothing was queued.
    #[error("cannot send while {state}")]
    SendWhileDisconnected { state: ConnectionState },

    /// The reconnect policy ran out of attempts.
    #[error("gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}
