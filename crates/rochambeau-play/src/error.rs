//! Error types for the play layer.

use rochambeau_session::SessionError;

use crate::{GameState, QueueState};

/// Errors returned by the queue and game state machines.
#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    /// The underlying session refused the request (usually because it is
    /// not connected).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// `make_move` was called while the server was not waiting for a move.
    #[error("no move expected while {state}")]
    MoveNotExpected { state: GameState },

    /// A queue operation that needs a queued player, called while not
    /// queued.
    #[error("not in queue")]
    NotInQueue,

    /// `join_queue` was called while already joining or queued.
    #[error("already queued ({state})")]
    AlreadyQueued { state: QueueState },
}
