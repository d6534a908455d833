use async_trait::async_trait;

use crate::proto::FaultCode;

/// Why a tunnel is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// An operator or client asked for the tunnel to stop.
    UserRequested,
    /// The supervising process is shutting down.
    Shutdown,
    /// Something else; treated like any other teardown.
    Other,
}

/// A tunnel host: brings tunnels up, tears them down, and answers
/// control plane messages.
#[async_trait]
pub trait TunnelHost: Send + Sync {
    /// Run the start sequence to completion.
    ///
    /// On failure the same fault is both returned and recorded, so a
    /// later `retrieveLastError` query sees exactly what the caller
    /// saw.
    async fn start(&self) -> Result<(), FaultCode>;

    /// Tear the tunnel down. Safe to call at any time, in any state,
    /// and repeatedly.
    async fn stop(&self, reason: StopReason);

    /// Handle one control message, returning the encoded response, or
    /// `None` when the message deserves no reply.
    async fn handle_message(&self, data: &[u8]) -> Option<Vec<u8>>;
}
