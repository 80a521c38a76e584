//! Delivery boundary between the orchestrator and a connected client

use async_trait::async_trait;
use seqstream_core::PipelineEvent;

/// The client can no longer receive events
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client disconnected")]
pub struct Disconnected;

/// Ordered sink for one session's events
///
/// Events must reach the client in the order they are sent, without being held
/// back. A failed send means the client is gone and the session is cancelled.
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one event
    async fn send(&mut self, event: PipelineEvent) -> Result<(), Disconnected>;

    /// Whether the client has already gone away
    fn is_closed(&self) -> bool {
        false
    }

    /// Tear the channel down after the terminal event
    async fn close(&mut self);
}
