//! Reconnect policy: whether and when to re-dial after a dropped socket.
//!
//! A clean normal closure ends the session. Anything else is retried with
//! exponential backoff and random jitter, up to a fixed number of
//! attempts:
//!
//! ```text
//! attempt:   0      1      2      3      4      5
//! ceiling:   500ms  1s     2s     4s     8s     (give up)
//! delay:     ceiling × (1 - r),  r ∈ [0, jitter]
//! ```

use std::time::Duration;

use rand::Rng;
use rochambeau_transport::CloseReason;
use tracing::warn;

/// How a connection ended, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    /// Normal closure (code 1000) with a completed handshake. Terminal.
    Clean,
    /// Anything else: network loss, server restart, protocol violation.
    Abnormal,
}

/// Backoff and retry bound for re-establishing a dropped session.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts allowed before giving up. 0 disables
    /// reconnecting.
    pub max_attempts: u32,
    /// Delay ceiling for the first retry; doubles on each attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Largest fraction (0.0–1.0) randomly shaved off each delay so many
    /// clients dropped at once don't reconnect in lockstep.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.5,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn never() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Clamp and fix any out-of-range values so the policy is safe to use.
    ///
    /// - `jitter` clamped to `0.0..=1.0` (NaN becomes 0).
    /// - `base_delay` forced ≤ `max_delay`.
    pub fn validated(mut self) -> Self {
        if self.jitter.is_nan() {
            warn!("reconnect jitter is NaN, disabling jitter");
            self.jitter = 0.0;
        }
        self.jitter = self.jitter.clamp(0.0, 1.0);
        if self.base_delay > self.max_delay {
            warn!(
                base = ?self.base_delay,
                max = ?self.max_delay,
                "base_delay exceeds max_delay, clamping"
            );
            self.base_delay = self.max_delay;
        }
        self
    }

    /// Classifies a closure as terminal or retryable.
    pub fn classify(&self, reason: &CloseReason) -> Closure {
        if reason.is_normal() {
            Closure::Clean
        } else {
            Closure::Abnormal
        }
    }

    /// The delay before retry number `attempt` (0-based) with no jitter
    /// applied, or `None` once the bound is reached.
    pub fn ceiling_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }

    /// The jittered delay before retry number `attempt`, or `None` once
    /// the bound is reached.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        let ceiling = self.ceiling_for(attempt)?;
        if self.jitter <= 0.0 {
            return Some(ceiling);
        }
        let cut = rand::rng().random_range(0.0..=self.jitter);
        Some(ceiling.mul_f64(1.0 - cut))
    }
}
