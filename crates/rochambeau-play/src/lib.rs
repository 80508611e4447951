//! Play layer for Rochambeau: the matchmaking queue and the match itself.
//!
//! Each machine owns one [`Session`](rochambeau_session::Session) and turns
//! the server's messages into a small, observable state:
//!
//! - [`QueueMachine`]: join the queue, wait, get a game server address
//! - [`GameMachine`]: join the game, play rounds, receive the verdict
//!
//! Transitions are applied on the session task. Observers read the state
//! through `state()`/`wait_for()`; terminal transitions are reported once
//! through the callback passed at construction.

mod error;
pub mod game;
pub mod queue;

pub use error::PlayError;
pub use game::{GameMachine, GameState, MatchSummary, Round, Score};
pub use queue::{MESSAGE_LOG_LIMIT, MatchAssignment, QueueMachine, QueueState};
