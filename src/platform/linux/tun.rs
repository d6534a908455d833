use std::os::fd::{AsRawFd, RawFd};

use tokio_tun::Tun;
use tracing::info;

use crate::config::DEFAULT_MTU;
use crate::error::NetworkError;
use crate::platform::traits::PacketChannel;

/// Packet channel backed by a Linux TUN device.
///
/// The device is created down; bringing the link up is part of applying
/// network settings.
pub struct TunChannel {
    tun: Tun,
    name: String,
}

impl TunChannel {
    pub fn create(name: Option<&str>, mtu: Option<u32>) -> Result<Self, NetworkError> {
        let mtu = mtu.unwrap_or(DEFAULT_MTU);

        let tun = Tun::builder()
            .name(name.unwrap_or(""))
            .tap(false)
            .packet_info(false)
            .mtu(mtu as i32)
            .try_build()
            .map_err(|e| NetworkError::TunCreation(e.to_string()))?;

        let name = tun.name().to_string();
        info!("Created TUN device {} (mtu={})", name, mtu);

        Ok(Self { tun, name })
    }
}

impl PacketChannel for TunChannel {
    fn descriptor(&self) -> RawFd {
        // Hand out a duplicate so the engine registers its own fd with
        // the reactor and owns its lifetime. dup returns -1 on failure,
        // which is exactly the "unavailable" contract value.
        unsafe { libc::dup(self.tun.as_raw_fd()) }
    }

    fn interface_name(&self) -> &str {
        &self.name
    }
}
