//! Wire protocol for Rochambeau.
//!
//! This crate defines what the client and the two servers say to each
//! other:
//!
//! - **Types** ([`Envelope`], the four message catalogs, [`Move`],
//!   [`Outcome`], [`UserId`]): the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those structures
//!   become frames and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and session
//! (connection lifecycle). It knows nothing about sockets or retries.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope<T>) → Session (state, identity)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Discriminator, Envelope, GameId, GameRequest, GameResponse, MatchmakingRequest,
    MatchmakingResponse, Move, Outcome, Tagged, UserId,
};
