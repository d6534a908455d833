use std::net::IpAddr;

use async_trait::async_trait;
use futures::TryStreamExt;
use ip_network::IpNetwork;
use rtnetlink::Handle;
use tracing::{debug, info, warn};

use crate::config::{InterfaceAddress, NetworkSettings};
use crate::error::NetworkError;
use crate::platform::traits::NetworkConfigurator;

/// Applies network settings through rtnetlink.
pub struct LinuxNetworkConfigurator {
    handle: Handle,
}

impl LinuxNetworkConfigurator {
    pub async fn new() -> Result<Self, NetworkError> {
        let (connection, handle, _) =
            rtnetlink::new_connection().map_err(|e| NetworkError::Netlink(e.to_string()))?;

        // Drive the netlink connection in the background
        tokio::spawn(connection);

        Ok(Self { handle })
    }

    /// Bring an interface down, used during teardown.
    pub async fn link_down(&self, interface: &str) -> Result<(), NetworkError> {
        let index = self.interface_index(interface).await?;
        self.handle
            .link()
            .set(index)
            .down()
            .execute()
            .await
            .map_err(|e| NetworkError::Netlink(e.to_string()))?;
        Ok(())
    }

    async fn interface_index(&self, name: &str) -> Result<u32, NetworkError> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();

        if let Some(link) = links
            .try_next()
            .await
            .map_err(|e| NetworkError::Netlink(e.to_string()))?
        {
            return Ok(link.header.index);
        }

        Err(NetworkError::Netlink(format!("Interface {} not found", name)))
    }

    async fn add_address(&self, index: u32, addr: &InterfaceAddress) -> Result<(), NetworkError> {
        self.handle
            .address()
            .add(index, addr.ip, addr.prefix)
            .execute()
            .await
            .map_err(|e| NetworkError::AddAddress(e.to_string()))
    }

    async fn add_route(&self, index: u32, dest: &IpNetwork) -> Result<(), NetworkError> {
        match dest.network_address() {
            IpAddr::V4(ipv4) => self
                .handle
                .route()
                .add()
                .v4()
                .destination_prefix(ipv4, dest.netmask())
                .output_interface(index)
                .execute()
                .await
                .map_err(|e| NetworkError::AddRoute(e.to_string())),
            IpAddr::V6(ipv6) => self
                .handle
                .route()
                .add()
                .v6()
                .destination_prefix(ipv6, dest.netmask())
                .output_interface(index)
                .execute()
                .await
                .map_err(|e| NetworkError::AddRoute(e.to_string())),
        }
    }

    async fn set_link_up(&self, index: u32) -> Result<(), NetworkError> {
        self.handle
            .link()
            .set(index)
            .up()
            .execute()
            .await
            .map_err(|e| NetworkError::SetLinkUp(e.to_string()))
    }

    async fn set_mtu(&self, index: u32, mtu: u32) -> Result<(), NetworkError> {
        self.handle
            .link()
            .set(index)
            .mtu(mtu)
            .execute()
            .await
            .map_err(|e| NetworkError::Netlink(e.to_string()))
    }
}

#[async_trait]
impl NetworkConfigurator for LinuxNetworkConfigurator {
    async fn apply(&self, interface: &str, settings: &NetworkSettings) -> Result<(), NetworkError> {
        let index = self.interface_index(interface).await?;

        for addr in &settings.addresses {
            self.add_address(index, addr).await?;
            info!("Added address {} to {}", addr, interface);
        }

        self.set_link_up(index).await?;
        info!("Interface {} is up", interface);

        self.set_mtu(index, settings.mtu).await?;
        debug!("Set MTU to {}", settings.mtu);

        for route in &settings.routes {
            match self.add_route(index, route).await {
                Ok(()) => info!("Added route {} via {}", route, interface),
                // Routes can already exist, e.g. from a previous run.
                Err(e) => warn!("Failed to add route {}: {}", route, e),
            }
        }

        if !settings.dns.is_empty() {
            debug!(
                "DNS servers {:?} recorded but not installed; resolver setup is external",
                settings.dns
            );
        }

        Ok(())
    }
}
