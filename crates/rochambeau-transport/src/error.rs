/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Dialing the remote endpoint failed (refused, DNS, bad URL, timeout).
    #[error("connect to {url} failed: {source}")]
    ConnectFailed {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The connection was already closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}

impl TransportError {
    /// Wraps any displayable error as a failed dial.
    pub(crate) fn connect(
        url: &str,
        kind: std::io::ErrorKind,
        err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ConnectFailed {
            url: url.to_string(),
            source: std::io::Error::new(kind, err),
        }
    }
}
