//! Session configuration.

use std::time::Duration;

use tracing::warn;

use crate::ReconnectPolicy;

/// Configuration for session behavior.
///
/// Shared by every session an application builds, so it is cheap to
/// clone. Start from `SessionConfig::default()` and override the fields
/// you care about.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// When and how often to re-dial after an abnormal closure.
    pub reconnect: ReconnectPolicy,

    /// How long one dial may take before it counts as a failed attempt.
    ///
    /// Default: 10 seconds.
    pub dial_timeout: Duration,

    /// How long `close()` waits for the server to confirm before the
    /// session is marked Off anyway.
    ///
    /// Default: 5 seconds.
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            dial_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called by [`Session::new`](crate::Session::new). Zero timeouts are
    /// replaced by the defaults; the reconnect policy is validated too.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.dial_timeout.is_zero() {
            warn!(default = ?defaults.dial_timeout, "dial_timeout is zero, using default");
            self.dial_timeout = defaults.dial_timeout;
        }
        if self.close_timeout.is_zero() {
            warn!(default = ?defaults.close_timeout, "close_timeout is zero, using default");
            self.close_timeout = defaults.close_timeout;
        }
        self.reconnect = self.reconnect.validated();
        self
    }
}
