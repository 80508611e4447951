//! A headless Rochambeau player.
//!
//! ```text
//! ROCHAMBEAU_MATCHMAKING_URL=ws://localhost:3001 rps-bot [strategy] [matches]
//! ```
//!
//! Strategies: `rock`, `paper`, `scissors`, `random`, `counter` (plays
//! whatever beats the opponent's previous move). `ROCHAMBEAU_USER_ID`
//! pins the identity; otherwise one is generated.

use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use rochambeau::prelude::*;
use rochambeau::DEFAULT_MATCHMAKING_URL;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Always(Move),
    Random,
    Counter,
}

impl Strategy {
    fn pick(&self, last_opponent: Option<Move>) -> Move {
        match (self, last_opponent) {
            (Self::Always(value), _) => *value,
            (Self::Counter, Some(theirs)) => theirs.beaten_by(),
            (Self::Counter, None) | (Self::Random, _) => {
                Move::ALL[rand::rng().random_range(0..Move::ALL.len())]
            }
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "counter" => Ok(Self::Counter),
            other => other
                .parse::<Move>()
                .map(Self::Always)
                .map_err(|_| format!("unknown strategy {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Bot loop
// ---------------------------------------------------------------------------

/// Plays `matches` matches and returns the final record.
///
/// Gives up when a session runs out of reconnect attempts.
async fn run<C: Connector + Clone>(
    client: &mut Client<C>,
    strategy: Strategy,
    matches: u32,
) -> Result<MatchRecord, RochambeauError> {
    let mut health = tokio::time::interval(Duration::from_secs(1));
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);

    client.join_queue()?;
    while client.record().matches() < matches {
        match client.game().map(|game| game.watch_state()) {
            None => {
                tokio::select! {
                    event = client.step() => {
                        if event.is_none() {
                            break;
                        }
                    }
                    _ = health.tick() => ensure_connected(client)?,
                }
            }
            Some(mut states) => {
                play_match(client, strategy, &mut states, &mut health).await?;
                info!(record = %client.record(), "match done");
                if client.record().matches() < matches {
                    client.join_queue()?;
                }
            }
        }
    }
    Ok(client.record())
}

async fn play_match<C: Connector + Clone>(
    client: &mut Client<C>,
    strategy: Strategy,
    states: &mut watch::Receiver<GameState>,
    health: &mut Interval,
) -> Result<(), RochambeauError> {
    loop {
        let state = *states.borrow_and_update();
        if state == GameState::PendingMove {
            let last = client
                .game()
                .and_then(|game| game.rounds().last().map(|round| round.their_move));
            let value = strategy.pick(last);
            match client.make_move(value) {
                Ok(()) => debug!(%value, "played"),
                Err(err) => debug!(%err, "move not sent"),
            }
        }

        tokio::select! {
            event = client.step() => {
                debug!(?event, "game screen event");
                return Ok(());
            }
            changed = states.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            _ = health.tick() => ensure_connected(client)?,
        }
    }
}

fn ensure_connected<C: Connector + Clone>(client: &Client<C>) -> Result<(), RochambeauError> {
    let (failed, error) = match client.screen() {
        Screen::Queue(queue) => (queue.connection_failed(), queue.last_connection_error()),
        Screen::Game(game) => (game.connection_failed(), game.last_connection_error()),
    };
    if !failed {
        return Ok(());
    }
    match error.as_deref() {
        Some(SessionError::RetriesExhausted { attempts }) => {
            Err(SessionError::RetriesExhausted {
                attempts: *attempts,
            }
            .into())
        }
        Some(err) => {
            warn!(screen = client.screen().name(), %err, "connection down, retrying");
            Ok(())
        }
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rochambeau::logging::init();

    let mut args = std::env::args().skip(1);
    let strategy: Strategy = args.next().as_deref().unwrap_or("random").parse()?;
    let matches: u32 = match args.next() {
        Some(n) => n.parse()?,
        None => 1,
    };

    let url = std::env::var("ROCHAMBEAU_MATCHMAKING_URL")
        .unwrap_or_else(|_| DEFAULT_MATCHMAKING_URL.to_string());
    let mut builder = ClientConfig::builder().matchmaking_url(url);
    if let Ok(id) = std::env::var("ROCHAMBEAU_USER_ID") {
        builder = builder.user_id(id);
    }
    let config = builder.build();

    info!(url = %config.matchmaking_url, ?strategy, matches, "starting bot");
    let mut client = Client::new(WebSocketConnector::new(), config);

    let record = tokio::select! {
        record = run(&mut client, strategy, matches) => record?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            client.record()
        }
    };
    println!("final record: {record}");
    Ok(())
}
