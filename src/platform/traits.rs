use std::os::fd::RawFd;

use async_trait::async_trait;

use crate::config::NetworkSettings;
use crate::error::NetworkError;

/// Applies derived network settings to the host.
///
/// The host either accepts the whole settings object or rejects it; a
/// partial apply surfaces as an error.
#[async_trait]
pub trait NetworkConfigurator: Send + Sync {
    async fn apply(&self, interface: &str, settings: &NetworkSettings) -> Result<(), NetworkError>;
}

/// The packet channel backing a tunnel.
///
/// The channel owns the device; the engine drives packet flow through a
/// duplicated descriptor so the two sides can shut down independently.
pub trait PacketChannel: Send + Sync {
    /// A file descriptor for tunneled packet I/O, negative when the
    /// channel cannot produce one.
    fn descriptor(&self) -> RawFd;

    /// The interface name the channel is bound to.
    fn interface_name(&self) -> &str;
}
