//! Application Ports (Driven)
//!
//! Interfaces the connection driver uses to reach the outside world.
//! - [`FeedTransport`]: the feed socket
//! - [`AuthPort`]: feed authorisation with an access token
//! - [`FrameHandler`]: raw inbound frames for the message decoder
//! - [`DiagnosticsSink`] and [`Clock`]: observability and time

mod auth_port;
mod feed_transport_port;
mod frame_handler_port;

pub use auth_port::{AuthFailure, AuthPort};
pub use feed_transport_port::{FeedTransport, SocketEvent, TransportError};
pub use frame_handler_port::{DiscardFrames, FrameHandler};

pub use crate::domain::connection::{Clock, DiagnosticsSink, NoopDiagnostics, SystemClock};
