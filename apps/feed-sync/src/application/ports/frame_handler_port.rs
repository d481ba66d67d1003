//! Frame Handler Port (Driver Port)
//!
//! Receives raw inbound frames. Decoding frames into data messages is the
//! handler's concern.

/// Receiver of inbound feed frames.
pub trait FrameHandler: Send + Sync {
    /// Handle one inbound text frame.
    fn handle_frame(&self, frame: &str);
}

/// Frame handler that drops every frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardFrames;

impl FrameHandler for DiscardFrames {
    fn handle_frame(&self, frame: &str) {
        tracing::trace!(len = frame.len(), "Discarding feed frame");
    }
}
