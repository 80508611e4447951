//! # Rochambeau
//!
//! Realtime client for an online rock-paper-scissors service.
//!
//! The client queues with a matchmaking server, follows the assignment to
//! a game server, plays the match and returns to the queue. Every socket is
//! a reconnecting [`Session`](rochambeau_session::Session) that carries the
//! player's identity; the [`Client`] shell owns the identity, the running
//! [`MatchRecord`], and whichever state machine is active.
//!
//! ## Layers
//!
//! | crate | concern |
//! |---|---|
//! | `rochambeau-transport` | WebSocket (and in-memory) connections |
//! | `rochambeau-protocol` | envelope, message catalogs, codec |
//! | `rochambeau-session` | connection state, reconnect policy, identity |
//! | `rochambeau-play` | queue and game state machines |
//! | `rochambeau` | this shell, logging, configuration |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rochambeau::prelude::*;
//!
//! # async fn run() -> Result<(), RochambeauError> {
//! rochambeau::logging::init();
//!
//! let config = ClientConfig::builder()
//!     .matchmaking_url("ws://localhost:3001")
//!     .build();
//! let mut client = Client::new(WebSocketConnector, config);
//! client.join_queue()?;
//!
//! while let Some(event) = client.step().await {
//!     if let ClientEvent::MatchFinished(summary) = event {
//!         println!("{} -> {}", summary.result, client.record());
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
mod config;
mod error;
pub mod logging;

pub use client::{Client, ClientEvent, MatchRecord, Screen, game_url};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_MATCHMAKING_URL, IdentitySource};
pub use error::RochambeauError;

/// Common imports for building on the client.
pub mod prelude {
    pub use crate::{Client, ClientConfig, ClientEvent, MatchRecord, RochambeauError, Screen};

    pub use rochambeau_play::{
        GameMachine, GameState, MatchAssignment, MatchSummary, PlayError, QueueMachine,
        QueueState, Round, Score,
    };
    pub use rochambeau_protocol::{Move, Outcome, UserId};
    pub use rochambeau_session::{
        ConnectionState, IdentityCell, ReconnectPolicy, SessionConfig, SessionError,
    };
    pub use rochambeau_transport::{Connector, WebSocketConnector};
}

pub use rochambeau_play as play;
pub use rochambeau_protocol as protocol;
pub use rochambeau_session as session;
pub use rochambeau_transport as transport;
