//! The application shell: one queue or one game at a time.
//!
//! ```text
//!        ┌──────────── MatchFinished (record updated) ───────────┐
//!        ↓                                                       │
//!  Screen::Queue ──── MatchFound (dial game_url(address)) ──→ Screen::Game
//! ```
//!
//! The machines report terminal transitions as [`ClientEvent`]s on a
//! channel; [`Client::step`] receives the next one and switches screens.
//! Switching drops the old machine, which closes its session.

use std::fmt;

use rochambeau_play::{GameMachine, MatchAssignment, MatchSummary, QueueMachine};
use rochambeau_protocol::{Move, Outcome};
use rochambeau_session::IdentityCell;
use rochambeau_transport::Connector;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{ClientConfig, RochambeauError};

/// Turns a matchmaker-issued address into a dialable URL.
///
/// Addresses without a scheme get `ws://`.
pub fn game_url(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        address.to_string()
    } else {
        format!("ws://{address}")
    }
}

// ---------------------------------------------------------------------------
// MatchRecord
// ---------------------------------------------------------------------------

/// Cumulative wins and losses across matches. A draw counts half a win and
/// half a loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchRecord {
    // Half-points, so draws stay exact.
    half_wins: u32,
    half_losses: u32,
}

impl MatchRecord {
    pub fn record(&mut self, result: Outcome) {
        match result {
            Outcome::Win => self.half_wins += 2,
            Outcome::Loss => self.half_losses += 2,
            Outcome::Draw => {
                self.half_wins += 1;
                self.half_losses += 1;
            }
        }
    }

    pub fn wins(&self) -> f64 {
        f64::from(self.half_wins) / 2.0
    }

    pub fn losses(&self) -> f64 {
        f64::from(self.half_losses) / 2.0
    }

    /// Number of matches recorded.
    pub fn matches(&self) -> u32 {
        (self.half_wins + self.half_losses) / 2
    }
}

impl fmt::Display for MatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} W / {} L", self.wins(), self.losses())
    }
}

// ---------------------------------------------------------------------------
// Screen, ClientEvent
// ---------------------------------------------------------------------------

/// The active state machine.
pub enum Screen<C: Connector> {
    Queue(QueueMachine<C>),
    Game(GameMachine<C>),
}

impl<C: Connector> Screen<C> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queue(_) => "queue",
            Self::Game(_) => "game",
        }
    }
}

/// A terminal transition reported by one of the machines.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    MatchFound(MatchAssignment),
    MatchFinished(MatchSummary),
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Owns the identity, the match record and the current screen.
pub struct Client<C: Connector + Clone> {
    connector: C,
    config: ClientConfig,
    identity: IdentityCell,
    record: MatchRecord,
    screen: Screen<C>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl<C: Connector + Clone> Client<C> {
    /// Creates a client showing an idle queue. Call [`join_queue`] to
    /// start matchmaking.
    ///
    /// [`join_queue`]: Self::join_queue
    pub fn new(connector: C, config: ClientConfig) -> Self {
        let identity = config.identity.cell();
        let (events_tx, events) = mpsc::unbounded_channel();
        let screen = Screen::Queue(new_queue(&connector, &config, &identity, &events_tx));
        Self {
            connector,
            config,
            identity,
            record: MatchRecord::default(),
            screen,
            events_tx,
            events,
        }
    }

    pub fn identity(&self) -> &IdentityCell {
        &self.identity
    }

    pub fn record(&self) -> MatchRecord {
        self.record
    }

    pub fn screen(&self) -> &Screen<C> {
        &self.screen
    }

    /// The queue machine, if the queue screen is showing.
    pub fn queue(&self) -> Option<&QueueMachine<C>> {
        match &self.screen {
            Screen::Queue(queue) => Some(queue),
            Screen::Game(_) => None,
        }
    }

    /// The game machine, if a match is on.
    pub fn game(&self) -> Option<&GameMachine<C>> {
        match &self.screen {
            Screen::Game(game) => Some(game),
            Screen::Queue(_) => None,
        }
    }

    pub fn join_queue(&self) -> Result<(), RochambeauError> {
        let queue = self.queue().ok_or_else(|| self.wrong_screen("join_queue"))?;
        queue.join_queue()?;
        Ok(())
    }

    pub fn leave_queue(&self) -> Result<(), RochambeauError> {
        let queue = self.queue().ok_or_else(|| self.wrong_screen("leave_queue"))?;
        queue.leave_queue()?;
        Ok(())
    }

    pub fn make_move(&self, value: Move) -> Result<(), RochambeauError> {
        let game = self.game().ok_or_else(|| self.wrong_screen("make_move"))?;
        game.make_move(value)?;
        Ok(())
    }

    fn wrong_screen(&self, operation: &'static str) -> RochambeauError {
        RochambeauError::WrongScreen {
            operation,
            screen: self.screen.name(),
        }
    }

    /// Waits for the next terminal transition without applying it.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Applies `event`: a found match opens the game screen, a finished
    /// match updates the record and returns to a fresh queue.
    ///
    /// Events that do not fit the current screen are logged and dropped.
    pub fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::MatchFound(assignment) if self.queue().is_some() => {
                let url = game_url(&assignment.server_address);
                info!(%url, "match found, joining game");
                let events_tx = self.events_tx.clone();
                let game = GameMachine::start(
                    self.connector.clone(),
                    url,
                    self.identity.clone(),
                    self.config.session.clone(),
                    move |summary| {
                        let _ = events_tx.send(ClientEvent::MatchFinished(summary));
                    },
                );
                self.screen = Screen::Game(game);
            }
            ClientEvent::MatchFinished(summary) if self.game().is_some() => {
                self.record.record(summary.result);
                info!(result = %summary.result, record = %self.record, "match finished");
                self.screen = Screen::Queue(new_queue(
                    &self.connector,
                    &self.config,
                    &self.identity,
                    &self.events_tx,
                ));
            }
            event => {
                warn!(?event, screen = self.screen.name(), "stale client event, dropping");
            }
        }
    }

    /// Receives the next event, applies it and returns it.
    pub async fn step(&mut self) -> Option<ClientEvent> {
        let event = self.next_event().await?;
        self.handle_event(event.clone());
        Some(event)
    }
}

fn new_queue<C: Connector + Clone>(
    connector: &C,
    config: &ClientConfig,
    identity: &IdentityCell,
    events_tx: &mpsc::UnboundedSender<ClientEvent>,
) -> QueueMachine<C> {
    let events_tx = events_tx.clone();
    QueueMachine::new(
        connector.clone(),
        config.matchmaking_url.clone(),
        identity.clone(),
        config.session.clone(),
        move |assignment| {
            let _ = events_tx.send(ClientEvent::MatchFound(assignment));
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_url_adds_scheme() {
        assert_eq!(game_url("10.0.0.5:7000"), "ws://10.0.0.5:7000");
        assert_eq!(game_url(" 10.0.0.5:7000\n"), "ws://10.0.0.5:7000");
        assert_eq!(game_url("wss://game.example/play"), "wss://game.example/play");
    }

    #[test]
    fn test_record_counts_draws_as_halves() {
        let mut record = MatchRecord::default();
        record.record(Outcome::Win);
        record.record(Outcome::Draw);
        record.record(Outcome::Loss);
        record.record(Outcome::Win);

        assert_eq!(record.wins(), 2.5);
        assert_eq!(record.losses(), 1.5);
        assert_eq!(record.matches(), 4);
        assert_eq!(record.to_string(), "2.5 W / 1.5 L");
    }
}
