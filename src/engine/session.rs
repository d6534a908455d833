use std::net::{IpAddr, SocketAddr};

use boringtun::noise::{Tunn, TunnResult};
use ip_network::IpNetwork;
use x25519_dalek::StaticSecret;

use crate::error::EngineError;

use super::uapi::EnginePeer;

/// Noise session with one peer.
///
/// Owned by the event loop task; all mutation happens there.
pub(crate) struct Session {
    tunn: Tunn,
    endpoint: Option<SocketAddr>,
    allowed_ips: Vec<IpNetwork>,
}

impl Session {
    pub fn new(
        private_key: &StaticSecret,
        peer: &EnginePeer,
        index: u32,
    ) -> Result<Self, EngineError> {
        let tunn = Tunn::new(
            private_key.clone(),
            peer.public_key,
            peer.preshared_key,
            peer.persistent_keepalive,
            index,
            None,
        )
        .map_err(|e| EngineError::Noise(e.to_string()))?;

        Ok(Self {
            tunn,
            endpoint: peer.endpoint,
            allowed_ips: peer.allowed_ips.clone(),
        })
    }

    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.endpoint
    }

    /// Records the peer's current address, returning true on change.
    pub fn set_endpoint(&mut self, addr: SocketAddr) -> bool {
        if self.endpoint == Some(addr) {
            return false;
        }
        self.endpoint = Some(addr);
        true
    }

    /// Encrypt an outbound IP packet. The output buffer needs
    /// `src.len() + 32` bytes, or 148 for a handshake initiation.
    pub fn encapsulate<'a>(&mut self, src: &[u8], dst: &'a mut [u8]) -> TunnResult<'a> {
        self.tunn.encapsulate(src, dst)
    }

    /// Decrypt an inbound datagram.
    pub fn decapsulate<'a>(
        &mut self,
        src_addr: Option<IpAddr>,
        datagram: &[u8],
        dst: &'a mut [u8],
    ) -> TunnResult<'a> {
        self.tunn.decapsulate(src_addr, datagram, dst)
    }

    /// Drive keepalives and rekeys; call every 250ms.
    pub fn update_timers<'a>(&mut self, dst: &'a mut [u8]) -> TunnResult<'a> {
        self.tunn.update_timers(dst)
    }

    /// Whether `addr` may appear as an inner source for this peer.
    pub fn is_allowed_ip(&self, addr: IpAddr) -> bool {
        self.allowed_ips.iter().any(|network| network.contains(addr))
    }
}
