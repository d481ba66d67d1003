//! Feed Configuration Settings
//!
//! Configuration for one feed connection, loaded from `FEED_*` environment
//! variables (and a `.env` file when present).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `FEED_ENDPOINTS` | required, comma separated |
//! | `FEED_ACCESS_TOKEN` | none (requested at runtime) |
//! | `FEED_OPEN_SOCKET_TIMEOUT_SECS` | 40 |
//! | `FEED_FETCH_AUTH_TIMEOUT_SECS` | 40 |
//! | `FEED_UPDATE_AUTH_TIMEOUT_SECS` | 40 |
//! | `FEED_CLOSE_SOCKET_TIMEOUT_SECS` | 5 |
//! | `FEED_SHORT_LIVED_SOCKET_SECS` | 20 |
//! | `FEED_RECONNECT_DELAY_INITIAL_MS` | 500 |
//! | `FEED_RECONNECT_DELAY_MAX_SECS` | 30 |
//! | `FEED_RECONNECT_DELAY_MULTIPLIER` | 2.0 |
//! | `FEED_RECONNECT_JITTER_FACTOR` | 0.1 |
//! | `FEED_COMMAND_CAPACITY` | 256 |
//! | `FEED_EVENT_CAPACITY` | 1024 |

use std::time::Duration;

use crate::domain::connection::{AccessToken, EngineTimeouts};
use crate::infrastructure::backoff::BackoffConfig;

/// Connection action timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSettings {
    /// Socket open timeout.
    pub open_socket: Duration,
    /// Initial authorisation timeout.
    pub fetch_auth: Duration,
    /// Authorisation refresh timeout.
    pub update_auth: Duration,
    /// Socket close timeout.
    pub close_socket: Duration,
    /// Sockets closing sooner than this after opening count as short-lived.
    pub short_lived_socket: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        let engine = EngineTimeouts::default();
        Self {
            open_socket: engine.open_socket,
            fetch_auth: engine.fetch_auth,
            update_auth: engine.update_auth,
            close_socket: engine.close_socket,
            short_lived_socket: engine.short_lived_socket,
        }
    }
}

impl From<TimeoutSettings> for EngineTimeouts {
    fn from(settings: TimeoutSettings) -> Self {
        Self {
            open_socket: settings.open_socket,
            fetch_auth: settings.fetch_auth,
            update_auth: settings.update_auth,
            close_socket: settings.close_socket,
            short_lived_socket: settings.short_lived_socket,
        }
    }
}

/// Driver channel capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Command channel capacity.
    pub command_capacity: usize,
    /// Event broadcast capacity.
    pub event_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            command_capacity: 256,
            event_capacity: 1024,
        }
    }
}

/// Complete feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Candidate endpoints. One is picked at random per connect attempt.
    pub endpoints: Vec<String>,
    /// Initial access token.
    pub access_token: Option<AccessToken>,
    /// Action timeouts.
    pub timeouts: TimeoutSettings,
    /// Reconnect backoff.
    pub reconnect: BackoffConfig,
    /// Driver channels.
    pub channels: ChannelSettings,
}

impl FeedConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            access_token: None,
            timeouts: TimeoutSettings::default(),
            reconnect: BackoffConfig::default(),
            channels: ChannelSettings::default(),
        }
    }

    /// Set the initial access token.
    #[must_use]
    pub fn with_access_token(mut self, token: AccessToken) -> Self {
        self.access_token = Some(token);
        self
    }

    /// Load `.env` if present, then read the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `FEED_ENDPOINTS` is missing or lists no endpoint.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!(error = %e, "Failed to read .env file");
        }
        Self::from_env()
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `FEED_ENDPOINTS` is missing or lists no endpoint.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `FEED_ENDPOINTS` is missing or lists no endpoint.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = lookup("FEED_ENDPOINTS")
            .ok_or_else(|| ConfigError::MissingEnvVar("FEED_ENDPOINTS".to_string()))?;
        let endpoints: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        if endpoints.is_empty() {
            return Err(ConfigError::EmptyValue("FEED_ENDPOINTS".to_string()));
        }

        let access_token = lookup("FEED_ACCESS_TOKEN")
            .filter(|t| !t.is_empty())
            .map(AccessToken::new);

        let env = Env(&lookup);
        let timeout_defaults = TimeoutSettings::default();
        let timeouts = TimeoutSettings {
            open_socket: env.secs("FEED_OPEN_SOCKET_TIMEOUT_SECS", timeout_defaults.open_socket),
            fetch_auth: env.secs("FEED_FETCH_AUTH_TIMEOUT_SECS", timeout_defaults.fetch_auth),
            update_auth: env.secs("FEED_UPDATE_AUTH_TIMEOUT_SECS", timeout_defaults.update_auth),
            close_socket: env.secs(
                "FEED_CLOSE_SOCKET_TIMEOUT_SECS",
                timeout_defaults.close_socket,
            ),
            short_lived_socket: env.secs(
                "FEED_SHORT_LIVED_SOCKET_SECS",
                timeout_defaults.short_lived_socket,
            ),
        };

        let backoff_defaults = BackoffConfig::default();
        let reconnect = BackoffConfig {
            initial_delay: env.millis(
                "FEED_RECONNECT_DELAY_INITIAL_MS",
                backoff_defaults.initial_delay,
            ),
            max_delay: env.secs("FEED_RECONNECT_DELAY_MAX_SECS", backoff_defaults.max_delay),
            multiplier: env.parse(
                "FEED_RECONNECT_DELAY_MULTIPLIER",
                backoff_defaults.multiplier,
            ),
            jitter_factor: env.parse(
                "FEED_RECONNECT_JITTER_FACTOR",
                backoff_defaults.jitter_factor,
            ),
        };

        let channel_defaults = ChannelSettings::default();
        let channels = ChannelSettings {
            command_capacity: env
                .parse("FEED_COMMAND_CAPACITY", channel_defaults.command_capacity)
                .max(1),
            event_capacity: env
                .parse("FEED_EVENT_CAPACITY", channel_defaults.event_capacity)
                .max(1),
        };

        Ok(Self {
            endpoints,
            access_token,
            timeouts,
            reconnect,
            channels,
        })
    }

    /// Engine timeouts for these settings.
    #[must_use]
    pub fn engine_timeouts(&self) -> EngineTimeouts {
        self.timeouts.into()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Optional variables fall back to their default when absent or unparsable.
struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
