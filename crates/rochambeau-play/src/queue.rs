//! The matchmaking queue state machine.
//!
//! ```text
//!              join_queue()              JoinedQueue
//! NotInQueue ──────────────→ Connecting ────────────→ InQueue
//!     ↑                          │                       │
//!     │        leave_queue()     │                       │
//!     ├──────────────────────────┴───────────────────────┤
//!     │                                                  │
//!     └──────── MatchFound / JoinServer ─────────────────┘
//!               (on_match_found fires once)
//! ```
//!
//! Connection trouble never changes [`QueueState`]; it shows up separately
//! through [`QueueMachine::connection_state`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rochambeau_protocol::{GameId, MatchmakingRequest, MatchmakingResponse, Tagged};
use rochambeau_session::{
    ConnectionState, IdentityCell, Session, SessionConfig, SessionError,
};
use rochambeau_transport::Connector;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::PlayError;

/// A session speaking the matchmaking catalog.
pub type MatchmakingSession<C> = Session<C, MatchmakingRequest, MatchmakingResponse>;

/// How many server messages [`QueueMachine::messages`] keeps.
pub const MESSAGE_LOG_LIMIT: usize = 64;

/// Callback invoked once per assignment.
pub type MatchFoundHandler = Arc<dyn Fn(MatchAssignment) + Send + Sync>;

// ---------------------------------------------------------------------------
// QueueState
// ---------------------------------------------------------------------------

/// Where the local player stands in matchmaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueState {
    #[default]
    NotInQueue,
    Connecting,
    InQueue,
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotInQueue => "not in queue",
            Self::Connecting => "connecting",
            Self::InQueue => "in queue",
        })
    }
}

/// The game server the matchmaker sent us to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAssignment {
    /// `None` when the address was re-issued through `JoinServer`.
    pub game_id: Option<GameId>,
    /// `host:port`, sometimes with a scheme.
    pub server_address: String,
}

// ---------------------------------------------------------------------------
// QueueCore: the pure transition function
// ---------------------------------------------------------------------------

/// Queue state plus everything learned from the server.
///
/// Shared between the machine and the session callback; all transitions
/// happen in [`QueueCore::on_response`].
pub(crate) struct QueueCore {
    state: watch::Sender<QueueState>,
    identity: IdentityCell,
    time_in_queue: Option<Duration>,
    last_server_error: Option<String>,
    messages: VecDeque<MatchmakingResponse>,
}

impl QueueCore {
    pub(crate) fn new(identity: IdentityCell) -> Self {
        Self {
            state: watch::Sender::new(QueueState::NotInQueue),
            identity,
            time_in_queue: None,
            last_server_error: None,
            messages: VecDeque::with_capacity(MESSAGE_LOG_LIMIT),
        }
    }

    pub(crate) fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    fn set(&self, next: QueueState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "queue state changed");
        }
    }

    /// Applies one server message. Returns the assignment if this message
    /// ended the queue.
    pub(crate) fn on_response(
        &mut self,
        response: MatchmakingResponse,
    ) -> Option<MatchAssignment> {
        if self.messages.len() == MESSAGE_LOG_LIMIT {
            self.messages.pop_front();
        }
        self.messages.push_back(response.clone());
        let state = self.state();

        match response {
            MatchmakingResponse::Connected { user_id } => {
                match user_id {
                    Some(id) => {
                        self.identity.learn(id);
                    }
                    None => warn!("Connected message without a userId"),
                }
                None
            }
            MatchmakingResponse::JoinedQueue => {
                match state {
                    QueueState::Connecting | QueueState::InQueue => {
                        self.set(QueueState::InQueue);
                    }
                    QueueState::NotInQueue => {
                        debug!("JoinedQueue while not queued, ignoring");
                    }
                }
                None
            }
            MatchmakingResponse::QueuePing { time_elapsed } => {
                debug!(time_elapsed, "queue ping");
                self.time_in_queue = Some(Duration::from_secs(time_elapsed));
                None
            }
            MatchmakingResponse::MatchFound {
                game_id,
                server_address,
            } => self.assign(Some(game_id), server_address),
            MatchmakingResponse::JoinServer { server_address } => {
                self.assign(None, server_address)
            }
            MatchmakingResponse::Error { message } => {
                warn!(%message, "matchmaking server reported an error");
                self.last_server_error = Some(message);
                None
            }
            MatchmakingResponse::Unknown => {
                warn!(%state, "unhandled matchmaking message, ignoring");
                None
            }
        }
    }

    fn assign(
        &mut self,
        game_id: Option<GameId>,
        server_address: String,
    ) -> Option<MatchAssignment> {
        if self.state() == QueueState::NotInQueue {
            warn!(%server_address, "game assignment while not queued, ignoring");
            return None;
        }
        info!(
            game_id = game_id.as_ref().map(|id| id.0.as_str()).unwrap_or("-"),
            %server_address,
            "match found"
        );
        self.set(QueueState::NotInQueue);
        self.time_in_queue = None;
        Some(MatchAssignment {
            game_id,
            server_address,
        })
    }

    pub(crate) fn begin(&mut self) {
        self.messages.clear();
        self.time_in_queue = None;
        self.last_server_error = None;
        self.set(QueueState::Connecting);
    }

    pub(crate) fn reset(&mut self) {
        self.messages.clear();
        self.time_in_queue = None;
        self.set(QueueState::NotInQueue);
    }
}

// ---------------------------------------------------------------------------
// QueueMachine
// ---------------------------------------------------------------------------

/// Drives the matchmaking queue over its own session.
///
/// Each `join_queue` builds a fresh session; a session is never re-dialed
/// once it has been connected and left.
pub struct QueueMachine<C: Connector> {
    connector: C,
    url: String,
    config: SessionConfig,
    identity: IdentityCell,
    session: Mutex<Option<MatchmakingSession<C>>>,
    core: Arc<Mutex<QueueCore>>,
    states: watch::Receiver<QueueState>,
    on_match_found: MatchFoundHandler,
}

impl<C: Connector + Clone> QueueMachine<C> {
    /// Creates a machine in `NotInQueue`. Nothing is dialed yet.
    pub fn new(
        connector: C,
        url: impl Into<String>,
        identity: IdentityCell,
        config: SessionConfig,
        on_match_found: impl Fn(MatchAssignment) + Send + Sync + 'static,
    ) -> Self {
        let core = QueueCore::new(identity.clone());
        let states = core.state.subscribe();
        Self {
            connector,
            url: url.into(),
            config,
            identity,
            session: Mutex::new(None),
            core: Arc::new(Mutex::new(core)),
            states,
            on_match_found: Arc::new(on_match_found),
        }
    }

    /// Connects to the matchmaker and asks to be queued.
    ///
    /// `JoinQueue` is sent on every (re)open for as long as we are still
    /// waiting for a match.
    ///
    /// # Errors
    /// [`PlayError::AlreadyQueued`] unless `NotInQueue`.
    pub fn join_queue(&self) -> Result<(), PlayError> {
        {
            let mut core = self.core.lock();
            let state = core.state();
            if state != QueueState::NotInQueue {
                return Err(PlayError::AlreadyQueued { state });
            }
            core.begin();
        }

        let session = Session::new(
            self.connector.clone(),
            self.identity.clone(),
            self.config.clone(),
        );

        let core = Arc::clone(&self.core);
        let on_open = move || match core.lock().state() {
            QueueState::NotInQueue => None,
            QueueState::Connecting | QueueState::InQueue => {
                Some(MatchmakingRequest::JoinQueue)
            }
        };

        let core = Arc::clone(&self.core);
        let on_match_found = Arc::clone(&self.on_match_found);
        let on_message = move |response: MatchmakingResponse| {
            // Release the lock before handing control to the caller.
            let assignment = core.lock().on_response(response);
            if let Some(assignment) = assignment {
                on_match_found(assignment);
            }
        };

        session.connect(self.url.clone(), on_open, on_message);
        // Replacing the previous session drops (and closes) it.
        *self.session.lock() = Some(session);
        Ok(())
    }

    /// Leaves the queue: closes the session and forgets the message log.
    ///
    /// # Errors
    /// [`PlayError::NotInQueue`] if neither joining nor queued.
    pub fn leave_queue(&self) -> Result<(), PlayError> {
        if self.state() == QueueState::NotInQueue {
            return Err(PlayError::NotInQueue);
        }
        if let Some(session) = self.session.lock().as_ref() {
            session.close();
        }
        self.core.lock().reset();
        info!(url = %self.url, "left queue");
        Ok(())
    }

    /// Asks the server how long we have been queued.
    pub fn ping(&self) -> Result<(), PlayError> {
        self.send(MatchmakingRequest::Ping)
    }

    /// Asks the server to re-send our game server address.
    pub fn request_server(&self) -> Result<(), PlayError> {
        self.send(MatchmakingRequest::GetServer)
    }

    fn send(&self, request: MatchmakingRequest) -> Result<(), PlayError> {
        let guard = self.session.lock();
        let Some(session) = guard.as_ref() else {
            debug!(tag = request.tag(), "no matchmaking session");
            return Err(SessionError::SendWhileDisconnected {
                state: ConnectionState::Off,
            }
            .into());
        };
        session.send(&request)?;
        Ok(())
    }
}

impl<C: Connector> QueueMachine<C> {
    /// The queue state.
    pub fn state(&self) -> QueueState {
        *self.states.borrow()
    }

    /// A receiver that sees every queue state change.
    pub fn watch_state(&self) -> watch::Receiver<QueueState> {
        self.states.clone()
    }

    /// Waits until the queue state satisfies `predicate` and returns it.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&QueueState) -> bool,
    ) -> QueueState {
        let mut states = self.states.clone();
        match states.wait_for(predicate).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// The matchmaking socket's state, independent of the queue state.
    pub fn connection_state(&self) -> ConnectionState {
        self.session
            .lock()
            .as_ref()
            .map_or(ConnectionState::Off, |session| session.state())
    }

    /// `true` while the matchmaking socket is Failed.
    pub fn connection_failed(&self) -> bool {
        self.connection_state() == ConnectionState::Failed
    }

    /// The session's last diagnostic, if any.
    pub fn last_connection_error(&self) -> Option<Arc<SessionError>> {
        self.session
            .lock()
            .as_ref()
            .and_then(|session| session.last_error())
    }

    /// Time spent queued, as last reported by the server.
    pub fn time_in_queue(&self) -> Option<Duration> {
        self.core.lock().time_in_queue
    }

    /// The last `Error` message the server sent.
    pub fn last_server_error(&self) -> Option<String> {
        self.core.lock().last_server_error.clone()
    }

    /// Messages received since the last `join_queue`, oldest first.
    ///
    /// Only the newest [`MESSAGE_LOG_LIMIT`] are kept.
    pub fn messages(&self) -> Vec<MatchmakingResponse> {
        self.core.lock().messages.iter().cloned().collect()
    }

    /// The matchmaker URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}
