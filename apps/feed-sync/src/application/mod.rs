//! Application Layer - Subscriptions, reconciliation and ports.
//!
//! Services that turn decoded feed messages into consistent record lists,
//! and the port traits that infrastructure adapters implement.

/// Port interfaces for the feed socket, authorisation and diagnostics.
pub mod ports;

/// Subscription, reconciliation and session services.
pub mod services;
