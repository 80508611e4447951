//! The session handle: one logical connection to one server.
//!
//! A [`Session`] owns everything about its socket (the driver task, the
//! reconnect timer, the live connection) and exposes only `connect`,
//! `send`, `close` and read-only observers. The state machines above it
//! never touch the transport directly.
//!
//! # Generations
//!
//! Every `connect()` and every `close()` bumps a generation counter. The
//! driver task captures the generation it was spawned for and compares it
//! at every step; once it no longer matches, the task stops touching
//! shared state and exits. That is what makes `close()` able to preempt an
//! in-flight dial, a pending reconnect timer, and frames that were already
//! queued on the old socket.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use rochambeau_protocol::{Codec, Envelope, JsonCodec, ProtocolError, Tagged};
use rochambeau_transport::Connector;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};

use crate::driver::{Command, Driver};
use crate::{IdentityCell, SessionConfig, SessionError};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The lifecycle of a session's socket.
///
/// ```text
///          connect()            open + handshake
///   Off ─────────────→ Connecting ─────────────→ Connected
///    ↑                   ↑    │                      │
///    │   clean close     │    │ error / abnormal     │ error / abnormal
///    ├───────────────────┼────┼──────────────────────┤ close
///    │                   │    ▼                      ▼
///    │     retry timer   └── Failed ←────────────────┘
///    └────── close() ────────┘ (terminal once retries are exhausted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected and not trying to. Initial, and final after a clean
    /// close.
    #[default]
    Off,
    /// Dialing, or waiting for the transport to open.
    Connecting,
    /// Open and announced; `send` works.
    Connected,
    /// The last attempt failed. A retry may be pending.
    Failed,
}

impl ConnectionState {
    /// `true` while a connection is open or being opened.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        })
    }
}

// ---------------------------------------------------------------------------
// Shared: state visible to both the handle and the driver task
// ---------------------------------------------------------------------------

pub(crate) struct Shared {
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) generation: watch::Sender<u64>,
    /// Command channel of the open connection, tagged with its generation.
    live: Mutex<Option<(u64, mpsc::UnboundedSender<Command>)>>,
    last_error: Mutex<Option<Arc<SessionError>>>,
    pub(crate) identity: IdentityCell,
}

impl Shared {
    fn new(identity: IdentityCell) -> Self {
        Self {
            state: watch::Sender::new(ConnectionState::Off),
            generation: watch::Sender::new(0),
            live: Mutex::new(None),
            last_error: Mutex::new(None),
            identity,
        }
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        *self.generation.borrow() == generation
    }

    fn bump_generation(&self) -> u64 {
        let mut next = 0;
        self.generation.send_modify(|current| {
            *current += 1;
            next = *current;
        });
        next
    }

    /// Moves to `state` if `generation` is still current.
    ///
    /// The generation is checked under the state lock, so a concurrent
    /// `close()` either lands before (and this is a no-op) or after (and
    /// overrides this).
    pub(crate) fn set_state_if(&self, generation: u64, state: ConnectionState) -> bool {
        let mut current_generation = false;
        self.state.send_if_modified(|current| {
            if !self.is_current(generation) {
                return false;
            }
            current_generation = true;
            if *current == state {
                return false;
            }
            tracing::debug!(from = %current, to = %state, generation, "connection state changed");
            *current = state;
            true
        });
        current_generation
    }

    /// Publishes an open connection and moves to Connected, unless the
    /// generation is stale.
    pub(crate) fn open(
        &self,
        generation: u64,
        commands: mpsc::UnboundedSender<Command>,
    ) -> bool {
        let mut opened = false;
        self.state.send_if_modified(|current| {
            if !self.is_current(generation) {
                return false;
            }
            *self.live.lock() = Some((generation, commands));
            opened = true;
            tracing::debug!(from = %current, to = %ConnectionState::Connected, generation, "connection state changed");
            *current = ConnectionState::Connected;
            true
        });
        opened
    }

    /// Forgets the command channel of `generation`'s connection.
    pub(crate) fn retire(&self, generation: u64) {
        let mut live = self.live.lock();
        if matches!(live.as_ref(), Some((g, _)) if *g == generation) {
            *live = None;
        }
    }

    pub(crate) fn record(&self, error: SessionError) {
        *self.last_error.lock() = Some(Arc::new(error));
    }
}

/// Encodes `request` inside an envelope carrying the current identity.
pub(crate) fn encode_request<RQ: Serialize>(
    codec: &JsonCodec,
    identity: &IdentityCell,
    request: &RQ,
) -> Result<Vec<u8>, ProtocolError> {
    codec.encode(&Envelope::new(identity.get(), request))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One logical connection, generic over the transport and the request and
/// response catalogs it speaks.
///
/// ```ignore
/// let session: Session<_, MatchmakingRequest, MatchmakingResponse> =
///     Session::new(WebSocketConnector::new(), identity, SessionConfig::default());
///
/// session.connect(
///     "ws://localhost:3001",
///     || Some(MatchmakingRequest::JoinQueue),
///     |response| println!("{response:?}"),
/// );
/// ```
///
/// Dropping the handle closes the session.
pub struct Session<C, RQ, RS> {
    connector: Arc<C>,
    config: SessionConfig,
    codec: JsonCodec,
    shared: Arc<Shared>,
    _catalog: PhantomData<fn(RQ) -> RS>,
}

impl<C, RQ, RS> Session<C, RQ, RS>
where
    C: Connector,
    RQ: Tagged + Serialize + Send + 'static,
    RS: Tagged + DeserializeOwned + Send + 'static,
{
    /// Creates an idle (Off) session. Nothing is dialed until `connect`.
    pub fn new(connector: C, identity: IdentityCell, config: SessionConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config: config.validated(),
            codec: JsonCodec,
            shared: Arc::new(Shared::new(identity)),
            _catalog: PhantomData,
        }
    }

    /// Opens the session and keeps it open.
    ///
    /// On every transport open (the first and each reconnect) the session
    /// announces the identity, moves to Connected, calls `on_open` and
    /// sends what it returns. Every decoded inbound payload is passed to
    /// `on_message`, in arrival order, on the driver task.
    ///
    /// A no-op while Connecting or Connected. Must be called from within a
    /// Tokio runtime.
    pub fn connect<O, M>(&self, url: impl Into<String>, on_open: O, on_message: M)
    where
        O: Fn() -> Option<RQ> + Send + 'static,
        M: FnMut(RS) + Send + 'static,
    {
        let url = url.into();
        let state = self.state();
        if state.is_active() {
            tracing::debug!(%url, %state, "connect ignored, session already active");
            return;
        }

        let generation = self.shared.bump_generation();
        self.shared
            .set_state_if(generation, ConnectionState::Connecting);
        tracing::info!(%url, generation, "session connecting");

        let driver = Driver {
            url,
            generation,
            connector: Arc::clone(&self.connector),
            config: self.config.clone(),
            codec: self.codec,
            shared: Arc::clone(&self.shared),
            on_open,
            on_message,
            _catalog: PhantomData,
        };
        tokio::spawn(driver.run());
    }

    /// Sends `request` on the open connection.
    ///
    /// # Errors
    /// [`SessionError::SendWhileDisconnected`] unless Connected; the
    /// request is dropped, never queued. Also recorded as the last error.
    pub fn send(&self, request: &RQ) -> Result<(), SessionError> {
        let state = self.state();
        let live = match state {
            ConnectionState::Connected => self
                .shared
                .live
                .lock()
                .as_ref()
                .map(|(_, commands)| commands.clone()),
            _ => None,
        };

        let Some(commands) = live else {
            tracing::warn!(%state, tag = request.tag(), "send while disconnected, dropping");
            self.shared
                .record(SessionError::SendWhileDisconnected { state });
            return Err(SessionError::SendWhileDisconnected { state });
        };

        let frame = encode_request(&self.codec, &self.shared.identity, request)?;
        if commands.send(Command::Send(frame)).is_err() {
            // The driver let go of this connection between our check and now.
            let state = self.state();
            self.shared
                .record(SessionError::SendWhileDisconnected { state });
            return Err(SessionError::SendWhileDisconnected { state });
        }
        tracing::trace!(tag = request.tag(), "request queued");
        Ok(())
    }
}

impl<C, RQ, RS> Session<C, RQ, RS> {
    /// Ends the session gracefully.
    ///
    /// Cancels any pending retry or in-flight dial. An open connection is
    /// closed with code 1000 and the state becomes Off once the server
    /// confirms (or after `close_timeout`); otherwise Off is immediate.
    pub fn close(&self) {
        let generation = self.shared.bump_generation();
        let live = self.shared.live.lock().take();

        let requested = match live {
            Some((_, commands)) => commands.send(Command::Close { generation }).is_ok(),
            None => false,
        };

        if requested {
            tracing::info!(generation, "session closing");
        } else {
            self.shared.set_state_if(generation, ConnectionState::Off);
            tracing::info!(generation, "session closed");
        }
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Waits until the state satisfies `predicate` and returns it.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&ConnectionState) -> bool,
    ) -> ConnectionState {
        let mut states = self.shared.state.subscribe();
        match states.wait_for(predicate).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// The most recent non-fatal problem: a failed dial, a dropped socket,
    /// an undecodable frame, a rejected send, or exhausted retries.
    pub fn last_error(&self) -> Option<Arc<SessionError>> {
        self.shared.last_error.lock().clone()
    }

    /// The identity slot this session announces from and learns into.
    pub fn identity(&self) -> &IdentityCell {
        &self.shared.identity
    }

    /// The current generation. Bumped by every `connect` and `close`.
    pub fn generation(&self) -> u64 {
        *self.shared.generation.borrow()
    }
}

impl<C, RQ, RS> Drop for Session<C, RQ, RS> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C, RQ, RS> fmt::Debug for Session<C, RQ, RS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .field("identity", &self.shared.identity.get())
            .finish_non_exhaustive()
    }
}
