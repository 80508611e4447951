//! The in-match state machine.
//!
//! ```text
//! Connecting ──GameJoined──→ Connected ──PendingMove──→ PendingMove
//!                                                        │      ↑
//!                                           make_move()  │      │ (immediately)
//!                                                        ↓      │
//!                                   MoveSent ──RoundResult──→ RoundResult
//!
//! any ──MatchResult──→ MatchResult   (terminal, on_match_end fires once)
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rochambeau_protocol::{GameRequest, GameResponse, Move, Outcome};
use rochambeau_session::{ConnectionState, IdentityCell, Session, SessionConfig, SessionError};
use rochambeau_transport::Connector;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::PlayError;

/// A session speaking the game catalog.
pub type GameSession<C> = Session<C, GameRequest, GameResponse>;

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// Where the current match stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameState {
    #[default]
    Connecting,
    Connected,
    /// The server is waiting for our move.
    PendingMove,
    MoveSent,
    RoundResult { result: Outcome, opponent_move: Move },
    /// Terminal.
    MatchResult { result: Outcome, wins: u32, total: u32 },
}

impl GameState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::MatchResult { .. })
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::PendingMove => f.write_str("pending move"),
            Self::MoveSent => f.write_str("move sent"),
            Self::RoundResult {
                result,
                opponent_move,
            } => write!(f, "round {result} against {opponent_move}"),
            Self::MatchResult {
                result,
                wins,
                total,
            } => write!(f, "match {result} ({wins}/{total})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Score, Round, MatchSummary
// ---------------------------------------------------------------------------

/// Running round tally for one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Score {
    pub mine: u32,
    pub opponent: u32,
    pub draws: u32,
}

impl Score {
    pub fn total(&self) -> u32 {
        self.mine + self.opponent + self.draws
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.mine += 1,
            Outcome::Loss => self.opponent += 1,
            Outcome::Draw => self.draws += 1,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} ({} drawn)", self.mine, self.opponent, self.draws)
    }
}

/// One completed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
    /// `None` if the round resolved without a move from us (e.g. the
    /// server timed us out).
    pub my_move: Option<Move>,
    pub their_move: Move,
    pub outcome: Outcome,
}

/// The server's verdict plus our own tally, handed to `on_match_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSummary {
    pub result: Outcome,
    pub wins: u32,
    pub total: u32,
    pub tally: Score,
}

impl MatchSummary {
    /// Whether the server's numbers agree with the rounds we saw.
    pub fn is_consistent(&self) -> bool {
        self.wins == self.tally.mine && self.total == self.tally.total()
    }
}

/// Callback invoked once when the match ends.
pub type MatchEndHandler = Box<dyn FnMut(MatchSummary) + Send>;

// ---------------------------------------------------------------------------
// GameCore
// ---------------------------------------------------------------------------

pub(crate) struct GameCore {
    state: watch::Sender<GameState>,
    score: Score,
    last_move: Option<Move>,
    rounds: Vec<Round>,
    transitions: Vec<GameState>,
    summary: Option<MatchSummary>,
}

impl GameCore {
    pub(crate) fn new() -> Self {
        Self {
            state: watch::Sender::new(GameState::Connecting),
            score: Score::default(),
            last_move: None,
            rounds: Vec::new(),
            transitions: vec![GameState::Connecting],
            summary: None,
        }
    }

    pub(crate) fn state(&self) -> GameState {
        *self.state.borrow()
    }

    fn set(&mut self, next: GameState) {
        let previous = self.state.send_replace(next);
        debug!(from = %previous, to = %next, "game state changed");
        self.transitions.push(next);
    }

    /// Applies one server message. Returns the summary if this message
    /// ended the match.
    pub(crate) fn on_response(&mut self, response: GameResponse) -> Option<MatchSummary> {
        if self.state().is_finished() {
            debug!(?response, "match already over, ignoring");
            return None;
        }

        match response {
            GameResponse::GameJoined => {
                info!("joined game");
                self.set(GameState::Connected);
            }
            GameResponse::PendingMove => self.set(GameState::PendingMove),
            GameResponse::RoundResult { result, other_move } => {
                self.score.record(result);
                self.rounds.push(Round {
                    my_move: self.last_move.take(),
                    their_move: other_move,
                    outcome: result,
                });
                info!(%result, %other_move, score = %self.score, "round over");
                self.set(GameState::RoundResult {
                    result,
                    opponent_move: other_move,
                });
                self.set(GameState::PendingMove);
            }
            GameResponse::MatchResult {
                result,
                wins,
                total,
            } => {
                let summary = MatchSummary {
                    result,
                    wins,
                    total,
                    tally: self.score,
                };
                if !summary.is_consistent() {
                    warn!(
                        wins,
                        total,
                        tally = %self.score,
                        "server match result disagrees with observed rounds"
                    );
                }
                info!(%result, wins, total, "match over");
                self.set(GameState::MatchResult {
                    result,
                    wins,
                    total,
                });
                self.summary = Some(summary);
                return Some(summary);
            }
            GameResponse::Unknown => {
                warn!(state = %self.state(), "unhandled game message, ignoring");
            }
        }
        None
    }

    /// Checks that a move is expected and, if `send` succeeds, records it.
    pub(crate) fn commit_move(
        &mut self,
        value: Move,
        send: impl FnOnce() -> Result<(), SessionError>,
    ) -> Result<(), PlayError> {
        let state = self.state();
        if state != GameState::PendingMove {
            return Err(PlayError::MoveNotExpected { state });
        }
        send()?;
        self.last_move = Some(value);
        self.set(GameState::MoveSent);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GameMachine
// ---------------------------------------------------------------------------

/// Plays one match over its own session.
pub struct GameMachine<C: Connector> {
    url: String,
    session: GameSession<C>,
    core: Arc<Mutex<GameCore>>,
    states: watch::Receiver<GameState>,
}

impl<C: Connector> GameMachine<C> {
    /// Dials the game server and starts the match.
    ///
    /// `JoinGame` is sent on every (re)open until the match ends.
    /// `on_match_end` runs once, on the session task.
    pub fn start(
        connector: C,
        url: impl Into<String>,
        identity: IdentityCell,
        config: SessionConfig,
        on_match_end: impl FnMut(MatchSummary) + Send + 'static,
    ) -> Self {
        let url = url.into();
        let core = GameCore::new();
        let states = core.state.subscribe();
        let core = Arc::new(Mutex::new(core));
        let session = Session::new(connector, identity, config);

        let on_open = {
            let core = Arc::clone(&core);
            move || {
                if core.lock().state().is_finished() {
                    None
                } else {
                    Some(GameRequest::JoinGame)
                }
            }
        };

        let on_message = {
            let core = Arc::clone(&core);
            let mut on_match_end: MatchEndHandler = Box::new(on_match_end);
            move |response: GameResponse| {
                let summary = core.lock().on_response(response);
                if let Some(summary) = summary {
                    on_match_end(summary);
                }
            }
        };

        info!(%url, "starting game");
        session.connect(url.clone(), on_open, on_message);

        Self {
            url,
            session,
            core,
            states,
        }
    }

    /// Plays `value` for the current round.
    ///
    /// # Errors
    /// [`PlayError::MoveNotExpected`] unless the server is waiting for a
    /// move, or [`PlayError::Session`] if the socket is down. Either way
    /// the state is unchanged.
    pub fn make_move(&self, value: Move) -> Result<(), PlayError> {
        let mut core = self.core.lock();
        core.commit_move(value, || self.session.send(&GameRequest::Move { value }))?;
        info!(%value, "move sent");
        Ok(())
    }

    /// Closes the game session. The match state is kept for inspection.
    pub fn leave(&self) {
        info!(url = %self.url, "leaving game");
        self.session.close();
    }

    pub fn state(&self) -> GameState {
        *self.states.borrow()
    }

    /// A receiver that sees every game state change.
    pub fn watch_state(&self) -> watch::Receiver<GameState> {
        self.states.clone()
    }

    /// Waits until the game state satisfies `predicate` and returns it.
    pub async fn wait_for(&self, predicate: impl FnMut(&GameState) -> bool) -> GameState {
        let mut states = self.states.clone();
        match states.wait_for(predicate).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    pub fn score(&self) -> Score {
        self.core.lock().score
    }

    /// Completed rounds, oldest first.
    pub fn rounds(&self) -> Vec<Round> {
        self.core.lock().rounds.clone()
    }

    /// Every state entered, starting with `Connecting`.
    pub fn transitions(&self) -> Vec<GameState> {
        self.core.lock().transitions.clone()
    }

    /// Present once the match is over.
    pub fn summary(&self) -> Option<MatchSummary> {
        self.core.lock().summary
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn connection_failed(&self) -> bool {
        self.session.state() == ConnectionState::Failed
    }

    pub fn last_connection_error(&self) -> Option<Arc<SessionError>> {
        self.session.last_error()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(result: Outcome, other_move: Move) -> GameResponse {
        GameResponse::RoundResult { result, other_move }
    }

    fn ready() -> GameCore {
        let mut core = GameCore::new();
        core.on_response(GameResponse::GameJoined);
        core.on_response(GameResponse::PendingMove);
        core
    }

    #[test]
    fn test_join_then_pending_move() {
        let core = ready();
        assert_eq!(core.state(), GameState::PendingMove);
        assert_eq!(
            core.transitions,
            vec![
                GameState::Connecting,
                GameState::Connected,
                GameState::PendingMove
            ]
        );
    }

    #[test]
    fn test_move_only_when_pending() {
        let mut core = GameCore::new();
        let err = core.commit_move(Move::Rock, || Ok(())).unwrap_err();
        assert!(matches!(
            err,
            PlayError::MoveNotExpected {
                state: GameState::Connecting
            }
        ));

        let mut core = ready();
        core.commit_move(Move::Rock, || Ok(())).unwrap();
        assert_eq!(core.state(), GameState::MoveSent);

        // A second move in the same round is rejected.
        assert!(core.commit_move(Move::Paper, || Ok(())).is_err());
    }

    #[test]
    fn test_failed_send_keeps_state() {
        let mut core = ready();
        let err = core
            .commit_move(Move::Rock, || {
                Err(SessionError::SendWhileDisconnected {
                    state: ConnectionState::Failed,
                })
            })
            .unwrap_err();
        assert!(matches!(err, PlayError::Session(_)));
        assert_eq!(core.state(), GameState::PendingMove);
        assert_eq!(core.last_move, None);
    }

    #[test]
    fn test_round_result_scores_and_returns_to_pending() {
        let mut core = ready();
        core.commit_move(Move::Rock, || Ok(())).unwrap();
        core.on_response(round(Outcome::Win, Move::Scissors));

        assert_eq!(core.state(), GameState::PendingMove);
        assert_eq!(
            core.score,
            Score {
                mine: 1,
                opponent: 0,
                draws: 0
            }
        );
        assert_eq!(
            core.rounds,
            vec![Round {
                my_move: Some(Move::Rock),
                their_move: Move::Scissors,
                outcome: Outcome::Win,
            }]
        );
        assert!(core.transitions.contains(&GameState::RoundResult {
            result: Outcome::Win,
            opponent_move: Move::Scissors,
        }));
    }

    #[test]
    fn test_score_invariant_over_many_rounds() {
        let mut core = ready();
        let outcomes = [
            Outcome::Win,
            Outcome::Loss,
            Outcome::Draw,
            Outcome::Win,
            Outcome::Draw,
        ];
        for outcome in outcomes {
            core.on_response(round(outcome, Move::Paper));
        }
        assert_eq!(core.score.total(), outcomes.len() as u32);
        assert_eq!(core.score.mine, 2);
        assert_eq!(core.score.opponent, 1);
        assert_eq!(core.score.draws, 2);
        // No move was sent, so none is attributed.
        assert!(core.rounds.iter().all(|r| r.my_move.is_none()));
    }

    #[test]
    fn test_match_result_is_terminal_and_reported_once() {
        let mut core = ready();
        core.on_response(round(Outcome::Win, Move::Scissors));
        core.on_response(round(Outcome::Draw, Move::Rock));

        let summary = core
            .on_response(GameResponse::MatchResult {
                result: Outcome::Win,
                wins: 1,
                total: 2,
            })
            .expect("summary");
        assert!(summary.is_consistent());
        assert!(core.state().is_finished());

        assert_eq!(
            core.on_response(GameResponse::MatchResult {
                result: Outcome::Loss,
                wins: 0,
                total: 2,
            }),
            None
        );
        core.on_response(GameResponse::PendingMove);
        assert!(core.state().is_finished());
    }

    #[test]
    fn test_inconsistent_summary_still_reported() {
        let mut core = ready();
        let summary = core
            .on_response(GameResponse::MatchResult {
                result: Outcome::Win,
                wins: 3,
                total: 3,
            })
            .expect("summary");
        assert!(!summary.is_consistent());
        assert_eq!(summary.tally, Score::default());
    }

    #[test]
    fn test_unknown_keeps_state() {
        let mut core = ready();
        core.on_response(GameResponse::Unknown);
        assert_eq!(core.state(), GameState::PendingMove);
    }

    #[test]
    fn test_state_display() {
        let state = GameState::MatchResult {
            result: Outcome::Win,
            wins: 2,
            total: 3,
        };
        assert_eq!(state.to_string(), format!("match {} (2/3)", Outcome::Win));
        assert_eq!(GameState::PendingMove.to_string(), "pending move");
    }
}
