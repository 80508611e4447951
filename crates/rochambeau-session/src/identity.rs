//! The shared identity slot.
//!
//! One [`IdentityCell`] lives as long as the application. Every session the
//! application builds gets a clone, so an identity learned on the
//! matchmaking socket is announced again on the game socket.

use std::sync::Arc;

use parking_lot::RwLock;
use rochambeau_protocol::UserId;

/// A first-writer-wins slot holding the user's identity.
///
/// Once set the value never changes: later `None`s, blank ids and even
/// different ids are ignored.
#[derive(Debug, Clone, Default)]
pub struct IdentityCell {
    inner: Arc<RwLock<Option<UserId>>>,
}

impl IdentityCell {
    /// An empty cell. The server is expected to assign an identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cell that already holds `id`.
    pub fn with(id: UserId) -> Self {
        let cell = Self::new();
        cell.learn(id);
        cell
    }

    /// A cell holding a freshly generated identity.
    pub fn generated() -> Self {
        Self::with(UserId::generate())
    }

    /// The identity, if known.
    pub fn get(&self) -> Option<UserId> {
        self.inner.read().clone()
    }

    /// `true` once an identity has been stored.
    pub fn is_known(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Stores `id` unless an identity is already known or `id` is blank.
    ///
    /// Returns `true` if this call stored it.
    pub fn learn(&self, id: UserId) -> bool {
        if id.is_blank() {
            return false;
        }
        let mut slot = self.inner.write();
        match slot.as_ref() {
            Some(existing) => {
                if *existing != id {
                    tracing::debug!(
                        known = %existing,
                        offered = %id,
                        "ignoring different identity, first one wins"
                    );
                }
                false
            }
            None => {
                tracing::info!(user_id = %id, "identity learned");
                *slot = Some(id);
                true
            }
        }
    }
}
