//! In-process transport built on Tokio channels.
//!
//! [`MemoryConnector::pair`] returns a connector for the client side and a
//! [`MemoryListener`] that hands out one [`MemoryPeer`] per dial. The peer
//! plays the server: it reads what the client sent and can push frames,
//! close cleanly, fail, or vanish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{CloseReason, Connection, ConnectionId, Connector, Incoming, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Server-bound item: what the client put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// A data frame.
    Message(Vec<u8>),
    /// The client started the closing handshake.
    Close(CloseReason),
}

/// Client-bound item. `Err` injects a receive failure.
type Inbound = Result<Incoming, String>;

struct Shared {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    refusing: AtomicBool,
    dials: Mutex<Vec<String>>,
}

/// A [`Connector`] whose connections end at a [`MemoryListener`].
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    /// Creates a connected connector/listener pair.
    pub fn pair() -> (Self, MemoryListener) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let connector = Self {
            shared: Arc::new(Shared {
                accept_tx,
                refusing: AtomicBool::new(false),
                dials: Mutex::new(Vec::new()),
            }),
        };
        (connector, MemoryListener { accept_rx })
    }

    /// While `true`, every dial fails with `ConnectionRefused`.
    pub fn set_refusing(&self, refusing: bool) {
        self.shared.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Every URL dialed so far, in order, including refused ones.
    pub fn dials(&self) -> Vec<String> {
        self.shared.dials.lock().clone()
    }

    /// Number of dial attempts so far.
    pub fn dial_count(&self) -> usize {
        self.shared.dials.lock().len()
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError> {
        self.shared.dials.lock().push(url.to_string());

        if self.shared.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::connect(
                url,
                std::io::ErrorKind::ConnectionRefused,
                "memory listener refusing connections",
            ));
        }

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            id,
            url: url.to_string(),
            to_client,
            from_client,
        };
        self.shared.accept_tx.send(peer).map_err(|_| {
            let kind = std::io::ErrorKind::ConnectionRefused;
            TransportError::connect(url, kind, "memory listener dropped")
        })?;

        tracing::debug!(%id, url, "memory connection opened");
        Ok(MemoryConnection {
            id,
            to_server,
            from_server,
            close_echo: None,
        })
    }
}

/// Accepts the server ends of dialed memory connections.
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Waits for the next dial. `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Returns an already-queued dial without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.try_recv().ok()
    }
}

/// The server end of one memory connection.
pub struct MemoryPeer {
    id: ConnectionId,
    url: String,
    to_client: mpsc::UnboundedSender<Inbound>,
    from_client: mpsc::UnboundedReceiver<Outgoing>,
}

impl MemoryPeer {
    /// The connection's identifier (shared with the client end).
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The URL the client dialed.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next item the client sent. `None` once the client end is gone.
    pub async fn recv(&mut self) -> Option<Outgoing> {
        self.from_client.recv().await
    }

    /// Next data frame from the client as UTF-8 text.
    ///
    /// Returns `None` if the client closed or went away first.
    pub async fn recv_text(&mut self) -> Option<String> {
        match self.from_client.recv().await? {
            Outgoing::Message(data) => String::from_utf8(data).ok(),
            Outgoing::Close(_) => None,
        }
    }

    /// Pushes a text frame to the client. `false` if the client is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        let data = text.into().into_bytes();
        self.to_client.send(Ok(Incoming::Message(data))).is_ok()
    }

    /// Closes the connection with a completed handshake.
    pub fn close(self, code: u16, reason: &str) {
        let _ = self.to_client.send(Ok(Incoming::Closed(CloseReason {
            code,
            clean: true,
            reason: reason.to_string(),
        })));
    }

    /// Makes the client's next `recv` fail with a transport error.
    pub fn fail(self, message: &str) {
        let _ = self.to_client.send(Err(message.to_string()));
    }

    /// Vanishes without a close frame (abnormal closure on the client).
    pub fn drop_connection(self) {
        drop(self);
    }
}

/// The client end of one memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    to_server: mpsc::UnboundedSender<Outgoing>,
    from_server: mpsc::UnboundedReceiver<Inbound>,
    /// Set by `close`; returned by the next `recv` as the peer's echo.
    close_echo: Option<CloseReason>,
}

impl Connection for MemoryConnection {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.to_server.send(Outgoing::Message(data.to_vec())).map_err(|_| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "memory peer dropped",
            ))
        })
    }

    async fn recv(&mut self) -> Result<Incoming, TransportError> {
        if let Some(echo) = self.close_echo.take() {
            return Ok(Incoming::Closed(echo));
        }
        match self.from_server.recv().await {
            Some(Ok(incoming)) => Ok(incoming),
            Some(Err(message)) => Err(TransportError::ReceiveFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                message,
            ))),
            None => Ok(Incoming::Closed(CloseReason::abnormal("memory peer dropped"))),
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseReason {
            code,
            clean: true,
            reason: reason.to_string(),
        };
        // The peer may already be gone; the local echo still confirms.
        let _ = self.to_server.send(Outgoing::Close(frame.clone()));
        self.close_echo = Some(frame);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
