//! Exponential backoff with full jitter for the transport reconnect loop
//! (§4.1/§6).

use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::ReconnectConfig;

/// Reconnection policy with exponential backoff and full jitter.
///
/// Implements the "Full Jitter" algorithm recommended by AWS:
/// <https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/>
///
/// Unlike a broker-stream reconnect policy that gives up after N attempts,
/// §6 specifies "unlimited attempts" — `max_attempts` is therefore optional;
/// `None` means the policy never reports exhaustion.
#[derive(Debug)]
pub struct ReconnectPolicy {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    max_attempts: Option<u32>,
    current_attempt: u32,
    last_attempt: Option<Instant>,
}

impl ReconnectPolicy {
    /// Create an unlimited-attempts policy from a [`ReconnectConfig`].
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
            max_attempts: None,
            current_attempt: 0,
            last_attempt: None,
        }
    }

    /// Create a policy that gives up after `max_attempts`.
    #[must_use]
    pub const fn with_max_attempts(config: ReconnectConfig, max_attempts: u32) -> Self {
        Self {
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
            max_attempts: Some(max_attempts),
            current_attempt: 0,
            last_attempt: None,
        }
    }

    /// Calculate the next backoff duration with jitter.
    ///
    /// Returns `None` only if a finite `max_attempts` has been exceeded.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if !self.should_reconnect() {
            return None;
        }

        let base_ms = self.initial_backoff.as_millis() as f64;
        let exponential = base_ms
            * self
                .multiplier
                .powi(i32::try_from(self.current_attempt).unwrap_or(i32::MAX));
        let capped = exponential.min(self.max_backoff.as_millis() as f64);

        let jitter = if capped > 0.0 {
            rand::rng().random_range(0.0..capped)
        } else {
            0.0
        };

        self.current_attempt += 1;
        self.last_attempt = Some(Instant::now());

        Some(Duration::from_millis(jitter as u64))
    }

    /// Reset the policy after a successful connection.
    pub fn reset(&mut self) {
        self.current_attempt = 0;
        self.last_attempt = None;
    }

    /// Current attempt count.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Whether another reconnect attempt is permitted.
    #[must_use]
    pub const fn should_reconnect(&self) -> bool {
        match self.max_attempts {
            Some(max) => self.current_attempt < max,
            None => true,
        }
    }

    /// Time since the last attempt was recorded.
    #[must_use]
    pub fn time_since_last_attempt(&self) -> Option<Duration> {
        self.last_attempt.map(|t| t.elapsed())
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
