//! Client configuration and its builder.

use rochambeau_protocol::UserId;
use rochambeau_session::{IdentityCell, ReconnectPolicy, SessionConfig};

/// Where the matchmaker listens unless told otherwise.
pub const DEFAULT_MATCHMAKING_URL: &str = "ws://localhost:3001";

/// How the client comes by its user id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentitySource {
    /// A random id is generated locally before the first dial.
    #[default]
    Generated,
    /// A known id, e.g. restored from a previous run.
    Fixed(UserId),
    /// Start anonymous and adopt whatever the server sends first.
    ServerAssigned,
}

impl IdentitySource {
    pub(crate) fn cell(&self) -> IdentityCell {
        match self {
            Self::Generated => IdentityCell::generated(),
            Self::Fixed(id) => IdentityCell::with(id.clone()),
            Self::ServerAssigned => IdentityCell::new(),
        }
    }
}

/// Settings shared by the queue and game machines of one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub matchmaking_url: String,
    /// Used for both the matchmaking and the game sessions.
    pub session: SessionConfig,
    pub identity: IdentitySource,
}

impl ClientConfig {
    /// Creates a new builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            matchmaking_url: DEFAULT_MATCHMAKING_URL.to_string(),
            session: SessionConfig::default(),
            identity: IdentitySource::default(),
        }
    }
}

/// Builder for [`ClientConfig`].
///
/// # Example
///
/// ```rust
/// use rochambeau::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .matchmaking_url("ws://mm.example:3001")
///     .server_assigned_identity()
///     .build();
/// assert_eq!(config.matchmaking_url, "ws://mm.example:3001");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the matchmaking server URL.
    pub fn matchmaking_url(mut self, url: impl Into<String>) -> Self {
        self.config.matchmaking_url = url.into();
        self
    }

    /// Replaces the whole session configuration.
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    /// Sets only the reconnect policy.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.session.reconnect = policy;
        self
    }

    /// Uses a fixed user id.
    pub fn user_id(mut self, id: impl Into<UserId>) -> Self {
        self.config.identity = IdentitySource::Fixed(id.into());
        self
    }

    /// Leaves the id to the server.
    pub fn server_assigned_identity(mut self) -> Self {
        self.config.identity = IdentitySource::ServerAssigned;
        self
    }

    /// Finishes the configuration, sanitizing the session settings.
    pub fn build(self) -> ClientConfig {
        let mut config = self.config;
        config.session = config.session.validated();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::builder().build();
        assert_eq!(config.matchmaking_url, DEFAULT_MATCHMAKING_URL);
        assert_eq!(config.identity, IdentitySource::Generated);
        assert!(config.identity.cell().is_known());
    }

    #[test]
    fn test_fixed_identity() {
        let config = ClientConfig::builder().user_id("u9").build();
        assert_eq!(config.identity.cell().get(), Some(UserId::from("u9")));
    }

    #[test]
    fn test_server_assigned_identity_starts_unknown() {
        let config = ClientConfig::builder().server_assigned_identity().build();
        assert!(!config.identity.cell().is_known());
    }

    #[test]
    fn test_build_validates_session() {
        let config = ClientConfig::builder()
            .reconnect(ReconnectPolicy {
                max_attempts: 2,
                base_delay: Duration::from_secs(10),
                max_delay: Duration::from_secs(1),
                jitter: 7.0,
            })
            .build();
        let policy = &config.session.reconnect;
        assert!(policy.base_delay <= policy.max_delay);
        assert!(policy.jitter <= 1.0);
        assert_eq!(policy.max_attempts, 2);
    }
}
