//! Configuration Module
//!
//! Feed connection configuration loaded from the environment.

mod settings;

pub use settings::{ChannelSettings, ConfigError, FeedConfig, TimeoutSettings};
