//! Client sessions for Rochambeau.
//!
//! This crate owns the lifecycle of one logical connection:
//!
//! 1. **Session**: dial, announce the identity, pump frames, close
//!    ([`Session`], [`ConnectionState`])
//! 2. **Reconnection**: decide whether and when to re-dial after a drop
//!    ([`ReconnectPolicy`])
//! 3. **Identity**: remember who we are across sockets ([`IdentityCell`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Play Layer (above)  ← queue and game state machines drive a session
//!     ↕
//! Session Layer (this crate)  ← connection state, retries, identity
//!     ↕
//! Protocol + Transport (below)  ← envelopes, sockets
//! ```

mod config;
mod driver;
mod error;
mod identity;
mod reconnect;
mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use identity::IdentityCell;
pub use reconnect::{Closure, ReconnectPolicy};
pub use session::{ConnectionState, Session};
