//! Reconnect Backoff
//!
//! Exponential backoff with jitter for the delay the driver waits in
//! `ReconnectDelay`. The feed connection never gives up, so there is no
//! attempt limit; the delay is capped instead.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Reconnect delay sequence.
///
/// Reset it when the connection comes online so the next outage starts
/// from the initial delay again.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    /// Create a backoff at its initial delay.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial_delay,
            config,
            attempts: 0,
        }
    }

    /// Delay for the next reconnect, advancing the sequence.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let delay = self.jittered(self.current);

        let grown = if self.config.multiplier.is_finite() && self.config.multiplier > 0.0 {
            self.current.mul_f64(self.config.multiplier)
        } else {
            self.current
        };
        self.current = grown.min(self.config.max_delay);

        delay
    }

    /// Start over from the initial delay.
    pub const fn reset(&mut self) {
        self.current = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Delays handed out since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if factor.is_nan() || factor <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = factor.min(1.0);
        let scale = rand::rng().random_range(1.0 - spread..=1.0 + spread);
        delay.mul_f64(scale).max(Duration::from_millis(1))
    }
}
