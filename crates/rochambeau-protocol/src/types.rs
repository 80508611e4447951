//! Core protocol types for Rochambeau's wire format.
//!
//! Every frame in either direction is an [`Envelope`] around one variant of
//! a message catalog. There are four catalogs, one per direction per
//! server:
//!
//! | Catalog | Direction | Server |
//! |---|---|---|
//! | [`MatchmakingRequest`] | client → server | matchmaking |
//! | [`MatchmakingResponse`] | server → client | matchmaking |
//! | [`GameRequest`] | client → server | game |
//! | [`GameResponse`] | server → client | game |
//!
//! All four are internally tagged by a `"type"` field:
//!
//! ```text
//! { "userId": "u1", "payload": { "type": "MatchFound", "game_id": "g1", "server_address": "10.0.0.5:7000" } }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Codec, ProtocolError};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The identifier of one user of the service.
///
/// Opaque to the client: the server may assign one (`Connected { userId }`)
/// or the client may generate one up front. On the wire it is a plain
/// string thanks to `#[serde(transparent)]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Generates a fresh random identity (a UUID v4 string).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Parses a user-supplied identity, rejecting blank strings.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "user id must not be blank".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` if the id is empty or whitespace only.
    ///
    /// Servers occasionally send `""` before an id has been assigned;
    /// such values are never worth remembering.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The identifier of one match, assigned by the matchmaking server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Game vocabulary
// ---------------------------------------------------------------------------

/// A hand shape.
///
/// Lowercase on the wire (`"rock"`), which is what the game server's
/// clients send. The PascalCase spelling is accepted on input too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    #[serde(alias = "Rock")]
    Rock,
    #[serde(alias = "Paper")]
    Paper,
    #[serde(alias = "Scissors")]
    Scissors,
}

impl Move {
    /// All three moves, in the conventional order.
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Whether `self` beats `other`. `None` on a tie.
    pub fn beats(self, other: Move) -> Option<bool> {
        if self == other {
            return None;
        }
        Some(matches!(
            (self, other),
            (Move::Rock, Move::Scissors)
                | (Move::Scissors, Move::Paper)
                | (Move::Paper, Move::Rock)
        ))
    }

    /// The move that beats `self`.
    pub fn beaten_by(self) -> Move {
        match self {
            Move::Rock => Move::Paper,
            Move::Paper => Move::Scissors,
            Move::Scissors => Move::Rock,
        }
    }

    /// The outcome for the player who threw `self` against `other`.
    pub fn against(self, other: Move) -> Outcome {
        match self.beats(other) {
            Some(true) => Outcome::Win,
            Some(false) => Outcome::Loss,
            None => Outcome::Draw,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        })
    }
}

impl FromStr for Move {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rock" => Ok(Move::Rock),
            "paper" => Ok(Move::Paper),
            "scissors" => Ok(Move::Scissors),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown move {other:?}"
            ))),
        }
    }
}

/// The result of a round or a match, from the local player's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(alias = "win")]
    Win,
    #[serde(alias = "loss")]
    Loss,
    #[serde(alias = "draw")]
    Draw,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Draw => "draw",
        })
    }
}

// ---------------------------------------------------------------------------
// Tagged trait
// ---------------------------------------------------------------------------

/// Implemented by every message catalog.
///
/// The session layer is generic over catalogs; this is how it names a
/// message in logs and spots the catch-all variant without knowing the
/// concrete type.
pub trait Tagged {
    /// The `"type"` tag of this variant.
    fn tag(&self) -> &'static str;

    /// `true` for the catch-all variant a decoder produces when the tag
    /// was not recognised.
    fn is_unknown(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Matchmaking catalog
// ---------------------------------------------------------------------------

/// Client → matchmaking server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MatchmakingRequest {
    /// "Put me in the queue."
    JoinQueue,
    /// "Am I still queued?" Answered with `QueuePing`.
    Ping,
    /// "Tell me my game server again." Used after losing a game connection.
    GetServer,
}

impl Tagged for MatchmakingRequest {
    fn tag(&self) -> &'static str {
        match self {
            Self::JoinQueue => "JoinQueue",
            Self::Ping => "Ping",
            Self::GetServer => "GetServer",
        }
    }
}

/// Matchmaking server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MatchmakingResponse {
    /// Greeting that carries the identity the server will use for us.
    Connected {
        #[serde(rename = "userId", default)]
        user_id: Option<UserId>,
    },

    /// We are in the queue.
    JoinedQueue,

    /// Periodic keep-alive with the seconds spent queued so far.
    QueuePing {
        #[serde(rename = "timeElapsed", alias = "time_elapsed")]
        time_elapsed: u64,
    },

    /// A game server has been assigned.
    MatchFound {
        game_id: GameId,
        server_address: String,
    },

    /// Re-issued game server address (answer to `GetServer`).
    JoinServer {
        #[serde(alias = "server_ip", alias = "serverIp")]
        server_address: String,
    },

    /// The server rejected something we did.
    Error { message: String },

    /// Any `"type"` this client does not know.
    #[serde(other)]
    Unknown,
}

impl Tagged for MatchmakingResponse {
    fn tag(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "Connected",
            Self::JoinedQueue => "JoinedQueue",
            Self::QueuePing { .. } => "QueuePing",
            Self::MatchFound { .. } => "MatchFound",
            Self::JoinServer { .. } => "JoinServer",
            Self::Error { .. } => "Error",
            Self::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

// ---------------------------------------------------------------------------
// Game catalog
// ---------------------------------------------------------------------------

/// Client → game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameRequest {
    /// "I'm here for my match." Re-sent on every reconnect.
    JoinGame,
    /// Our move for the current round.
    Move { value: Move },
}

impl Tagged for GameRequest {
    fn tag(&self) -> &'static str {
        match self {
            Self::JoinGame => "JoinGame",
            Self::Move { .. } => "Move",
        }
    }
}

/// Game server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameResponse {
    /// The server accepted our `JoinGame`.
    GameJoined,
    /// The server is waiting for our move.
    PendingMove,
    /// One round resolved.
    RoundResult { result: Outcome, other_move: Move },
    /// The match is over. `wins` counts our round wins out of `total`.
    MatchResult {
        result: Outcome,
        wins: u32,
        total: u32,
    },
    /// Any `"type"` this client does not know.
    #[serde(other)]
    Unknown,
}

impl Tagged for GameResponse {
    fn tag(&self) -> &'static str {
        match self {
            Self::GameJoined => "GameJoined",
            Self::PendingMove => "PendingMove",
            Self::RoundResult { .. } => "RoundResult",
            Self::MatchResult { .. } => "MatchResult",
            Self::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level wire wrapper.
///
/// `userId` is `null` until an identity is known and may be missing
/// altogether on inbound frames, which decodes as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "userId", default)]
    pub user_id: Option<UserId>,
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps a payload.
    pub fn new(user_id: Option<UserId>, payload: T) -> Self {
        Self { user_id, payload }
    }
}

impl Envelope<()> {
    /// The identity announcement sent first on every (re)open:
    /// `{"userId": <id>, "payload": null}`.
    pub fn announce(user_id: Option<UserId>) -> Self {
        Self {
            user_id,
            payload: (),
        }
    }
}

// ---------------------------------------------------------------------------
// Discriminator probe
// ---------------------------------------------------------------------------

/// Just the tag of a payload, whatever catalog it belongs to.
///
/// Decoding into a catalog collapses unknown tags to `Unknown`; this probe
/// recovers the original string for logging. Both `"type"` and the older
/// `"kind"` spelling are read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Discriminator {
    #[serde(rename = "type", alias = "kind", default)]
    pub tag: Option<String>,
}

impl Discriminator {
    /// Reads the payload tag out of a raw envelope frame.
    pub fn peek<C: Codec>(codec: &C, frame: &[u8]) -> Option<String> {
        codec
            .decode::<Envelope<Discriminator>>(frame)
            .ok()
            .and_then(|envelope| envelope.payload.tag)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! JSON shape tests. The servers are external, so a wrong field name
    //! here means a silently broken client.

    use super::*;
    use serde_json::json;

    fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
        serde_json::to_value(value).unwrap()
    }

    // =====================================================================
    // Identity
    // =====================================================================

    #[test]
    fn test_user_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&UserId::from("u1")).unwrap();
        assert_eq!(json, "\"u1\"");
    }

    #[test]
    fn test_user_id_generate_is_uuid_and_unique() {
        let a = UserId::generate();
        let b = UserId::generate();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_user_id_parse_trims_and_rejects_blank() {
        assert_eq!(UserId::parse("  u7 ").unwrap(), UserId::from("u7"));
        assert!(matches!(
            UserId::parse("   "),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_user_id_is_blank() {
        assert!(UserId::from("").is_blank());
        assert!(!UserId::from("x").is_blank());
    }

    // =====================================================================
    // Move / Outcome
    // =====================================================================

    #[test]
    fn test_move_serializes_lowercase() {
        assert_eq!(to_json(&Move::Rock), json!("rock"));
        assert_eq!(to_json(&Move::Scissors), json!("scissors"));
    }

    #[test]
    fn test_move_accepts_pascal_case_input() {
        let m: Move = serde_json::from_str("\"Paper\"").unwrap();
        assert_eq!(m, Move::Paper);
    }

    #[test]
    fn test_move_beats_table() {
        assert_eq!(Move::Rock.beats(Move::Scissors), Some(true));
        assert_eq!(Move::Scissors.beats(Move::Paper), Some(true));
        assert_eq!(Move::Paper.beats(Move::Rock), Some(true));
        assert_eq!(Move::Rock.beats(Move::Paper), Some(false));
        for m in Move::ALL {
            assert_eq!(m.beats(m), None);
            assert_eq!(m.beaten_by().beats(m), Some(true));
        }
    }

    #[test]
    fn test_move_against_gives_outcome() {
        assert_eq!(Move::Rock.against(Move::Scissors), Outcome::Win);
        assert_eq!(Move::Rock.against(Move::Paper), Outcome::Loss);
        assert_eq!(Move::Rock.against(Move::Rock), Outcome::Draw);
    }

    #[test]
    fn test_move_from_str() {
        assert_eq!("ROCK".parse::<Move>().unwrap(), Move::Rock);
        assert!("lizard".parse::<Move>().is_err());
    }

    #[test]
    fn test_outcome_is_pascal_case_on_wire() {
        assert_eq!(to_json(&Outcome::Win), json!("Win"));
        let o: Outcome = serde_json::from_str("\"loss\"").unwrap();
        assert_eq!(o, Outcome::Loss);
    }

    // =====================================================================
    // Matchmaking catalog
    // =====================================================================

    #[test]
    fn test_matchmaking_requests_json_format() {
        assert_eq!(
            to_json(&MatchmakingRequest::JoinQueue),
            json!({"type": "JoinQueue"})
        );
        assert_eq!(to_json(&MatchmakingRequest::Ping), json!({"type": "Ping"}));
        assert_eq!(
            to_json(&MatchmakingRequest::GetServer),
            json!({"type": "GetServer"})
        );
    }

    #[test]
    fn test_matchmaking_connected_reads_user_id() {
        let msg: MatchmakingResponse =
            serde_json::from_str(r#"{"type":"Connected","userId":"u1"}"#).unwrap();
        assert_eq!(
            msg,
            MatchmakingResponse::Connected {
                user_id: Some(UserId::from("u1"))
            }
        );
    }

    #[test]
    fn test_matchmaking_connected_without_user_id() {
        let msg: MatchmakingResponse =
            serde_json::from_str(r#"{"type":"Connected"}"#).unwrap();
        assert_eq!(msg, MatchmakingResponse::Connected { user_id: None });
    }

    #[test]
    fn test_matchmaking_queue_ping_accepts_both_spellings() {
        let camel: MatchmakingResponse =
            serde_json::from_str(r#"{"type":"QueuePing","timeElapsed":12}"#).unwrap();
        let snake: MatchmakingResponse =
            serde_json::from_str(r#"{"type":"QueuePing","time_elapsed":12}"#).unwrap();
        assert_eq!(camel, MatchmakingResponse::QueuePing { time_elapsed: 12 });
        assert_eq!(camel, snake);
    }

    #[test]
    fn test_matchmaking_match_found_json_format() {
        let msg = MatchmakingResponse::MatchFound {
            game_id: GameId::from("g1"),
            server_address: "10.0.0.5:7000".into(),
        };
        assert_eq!(
            to_json(&msg),
            json!({"type": "MatchFound", "game_id": "g1", "server_address": "10.0.0.5:7000"})
        );
    }

    #[test]
    fn test_matchmaking_join_server_accepts_server_ip() {
        let msg: MatchmakingResponse =
            serde_json::from_str(r#"{"type":"JoinServer","server_ip":"::1"}"#).unwrap();
        assert_eq!(
            msg,
            MatchmakingResponse::JoinServer {
                server_address: "::1".into()
            }
        );
    }

    #[test]
    fn test_matchmaking_unknown_type_decodes_as_unknown() {
        let msg: MatchmakingResponse =
            serde_json::from_str(r#"{"type":"Maintenance","eta":30}"#).unwrap();
        assert_eq!(msg, MatchmakingResponse::Unknown);
        assert!(msg.is_unknown());
    }

    #[test]
    fn test_matchmaking_known_type_with_bad_fields_is_error() {
        // A known tag with the wrong shape must fail, not become Unknown.
        let result: Result<MatchmakingResponse, _> =
            serde_json::from_str(r#"{"type":"MatchFound","game_id":"g1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_matchmaking_response_tags() {
        assert_eq!(MatchmakingResponse::JoinedQueue.tag(), "JoinedQueue");
        assert_eq!(
            MatchmakingResponse::Error {
                message: "x".into()
            }
            .tag(),
            "Error"
        );
        assert!(!MatchmakingResponse::JoinedQueue.is_unknown());
    }

    // =====================================================================
    // Game catalog
    // =====================================================================

    #[test]
    fn test_game_move_request_json_format() {
        let msg = GameRequest::Move { value: Move::Rock };
        assert_eq!(to_json(&msg), json!({"type": "Move", "value": "rock"}));
        assert_eq!(to_json(&GameRequest::JoinGame), json!({"type": "JoinGame"}));
    }

    #[test]
    fn test_game_round_result_decodes() {
        let msg: GameResponse = serde_json::from_str(
            r#"{"type":"RoundResult","result":"Win","other_move":"scissors"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            GameResponse::RoundResult {
                result: Outcome::Win,
                other_move: Move::Scissors
            }
        );
    }

    #[test]
    fn test_game_match_result_decodes() {
        let msg: GameResponse = serde_json::from_str(
            r#"{"type":"MatchResult","result":"Draw","wins":1,"total":3}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            GameResponse::MatchResult {
                result: Outcome::Draw,
                wins: 1,
                total: 3
            }
        );
    }

    #[test]
    fn test_game_unknown_type_decodes_as_unknown() {
        let msg: GameResponse =
            serde_json::from_str(r#"{"type":"Emote","value":"wave"}"#).unwrap();
        assert_eq!(msg, GameResponse::Unknown);
        assert_eq!(msg.tag(), "Unknown");
    }

    // =====================================================================
    // Envelope
    // =====================================================================

    #[test]
    fn test_envelope_json_format() {
        let envelope = Envelope::new(
            Some(UserId::from("u1")),
            MatchmakingRequest::JoinQueue,
        );
        assert_eq!(
            to_json(&envelope),
            json!({"userId": "u1", "payload": {"type": "JoinQueue"}})
        );
    }

    #[test]
    fn test_envelope_announce_has_null_payload() {
        assert_eq!(
            to_json(&Envelope::announce(Some(UserId::from("u1")))),
            json!({"userId": "u1", "payload": null})
        );
        assert_eq!(
            to_json(&Envelope::announce(None)),
            json!({"userId": null, "payload": null})
        );
    }

    #[test]
    fn test_envelope_missing_user_id_is_none() {
        let envelope: Envelope<GameResponse> =
            serde_json::from_str(r#"{"payload":{"type":"GameJoined"}}"#).unwrap();
        assert_eq!(envelope.user_id, None);
        assert_eq!(envelope.payload, GameResponse::GameJoined);
    }

    /// Wraps each payload with and without a user id and checks it
    /// survives an encode and decode unchanged.
    fn assert_round_trips<T>(payloads: Vec<T>)
    where
        T: Serialize + serde::de::DeserializeOwned + PartialEq + fmt::Debug + Clone,
    {
        for payload in payloads {
            for user_id in [None, Some(UserId::from("u2"))] {
                let envelope = Envelope::new(user_id, payload.clone());
                let bytes = serde_json::to_vec(&envelope).unwrap();
                let decoded: Envelope<T> = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(envelope, decoded, "{}", String::from_utf8_lossy(&bytes));
            }
        }
    }

    #[test]
    fn test_envelope_round_trip_over_both_catalogs() {
        assert_round_trips(vec![
            MatchmakingRequest::JoinQueue,
            MatchmakingRequest::Ping,
            MatchmakingRequest::GetServer,
        ]);
        assert_round_trips(vec![
            MatchmakingResponse::Connected { user_id: None },
            MatchmakingResponse::Connected {
                user_id: Some(UserId::from("u1")),
            },
            MatchmakingResponse::JoinedQueue,
            MatchmakingResponse::QueuePing { time_elapsed: 4 },
            MatchmakingResponse::MatchFound {
                game_id: GameId::from("g1"),
                server_address: "10.0.0.5:7000".into(),
            },
            MatchmakingResponse::JoinServer {
                server_address: "10.0.0.6:7000".into(),
            },
            MatchmakingResponse::Error {
                message: "not in queue".into(),
            },
            MatchmakingResponse::Unknown,
        ]);
        assert_round_trips(
            std::iter::once(GameRequest::JoinGame)
                .chain(Move::ALL.map(|value| GameRequest::Move { value }))
                .collect(),
        );
        let mut game = vec![GameResponse::GameJoined, GameResponse::PendingMove];
        for result in [Outcome::Win, Outcome::Loss, Outcome::Draw] {
            game.push(GameResponse::RoundResult {
                result,
                other_move: Move::Scissors,
            });
            game.push(GameResponse::MatchResult {
                result,
                wins: 2,
                total: 3,
            });
        }
        game.push(GameResponse::Unknown);
        assert_round_trips(game);
    }

    #[test]
    fn test_envelope_missing_payload_is_error() {
        let result: Result<Envelope<GameResponse>, _> =
            serde_json::from_str(r#"{"userId":"u1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_garbage_returns_error() {
        let result: Result<Envelope<GameResponse>, _> =
            serde_json::from_slice(b"not json at all");
        assert!(result.is_err());
    }

    // =====================================================================
    // Discriminator
    // =====================================================================

    #[cfg(feature = "json")]
    #[test]
    fn test_discriminator_peeks_type_and_kind() {
        let codec = crate::JsonCodec;
        assert_eq!(
            Discriminator::peek(&codec, br#"{"payload":{"type":"Maintenance"}}"#),
            Some("Maintenance".into())
        );
        assert_eq!(
            Discriminator::peek(&codec, br#"{"payload":{"kind":"QueuePing"}}"#),
            Some("QueuePing".into())
        );
        assert_eq!(Discriminator::peek(&codec, br#"{"payload":null}"#), None);
        assert_eq!(Discriminator::peek(&codec, b"garbage"), None);
    }
}
