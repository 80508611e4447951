//! Transport abstraction layer for Rochambeau.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! the client side of a persistent, message-oriented socket. The session
//! layer only ever talks to these traits, so the same reconnect logic runs
//! over a real WebSocket or over the in-process [`MemoryConnector`].
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//! - `memory`: in-process transport for tests and offline runs

mod error;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryConnection, MemoryConnector, MemoryListener, MemoryPeer, Outgoing};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Close code for a graceful, user-initiated shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when a close frame carried no status.
pub const NO_STATUS: u16 = 1005;

/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// The close code (RFC 6455 numbering).
    pub code: u16,
    /// `true` if the closing handshake completed.
    pub clean: bool,
    /// Free-form reason text sent with the close frame.
    pub reason: String,
}

impl CloseReason {
    /// A completed handshake with code 1000.
    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: NORMAL_CLOSURE,
            clean: true,
            reason: reason.into(),
        }
    }

    /// The connection vanished without a closing handshake.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            clean: false,
            reason: reason.into(),
        }
    }

    /// `true` only for a clean close with code 1000.
    pub fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE && self.clean
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clean = if self.clean { "clean" } else { "unclean" };
        if self.reason.is_empty() {
            write!(f, "{} ({clean})", self.code)
        } else {
            write!(f, "{} ({clean}): {}", self.code, self.reason)
        }
    }
}

/// One inbound event from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A data frame (text or binary).
    Message(Vec<u8>),
    /// The connection closed. No further events follow.
    Closed(CloseReason),
}

/// Dials new outbound connections.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a connection to `url`.
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single connection that can send and receive messages.
///
/// A connection is exclusively owned by one task, so every method takes
/// `&mut self`.
pub trait Connection: Send + 'static {
    /// Sends one message to the remote peer.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next inbound event.
    ///
    /// After [`Incoming::Closed`] has been returned the connection is dead.
    fn recv(&mut self) -> impl Future<Output = Result<Incoming, TransportError>> + Send;

    /// Starts the closing handshake with the given code and reason.
    ///
    /// The confirmation arrives later as [`Incoming::Closed`] from `recv`.
    fn close(
        &mut self,
        code: u16,
        reason: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_close_reason_normal_requires_code_and_clean_flag() {
        assert!(CloseReason::normal("bye").is_normal());
        assert!(!CloseReason::abnormal("dropped").is_normal());

        // 1000 without a completed handshake is still abnormal.
        let half = CloseReason {
            code: NORMAL_CLOSURE,
            clean: false,
            reason: String::new(),
        };
        assert!(!half.is_normal());

        // A clean close with another code (e.g. server going away) too.
        let going_away = CloseReason {
            code: 1001,
            clean: true,
            reason: String::new(),
        };
        assert!(!going_away.is_normal());
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::normal("").to_string(), "1000 (clean)");
        assert_eq!(CloseReason::abnormal("reset").to_string(), "1006 (unclean): reset");
    }
}
