use std::net::{IpAddr, SocketAddr};

use ip_network::IpNetwork;

use super::types::{InterfaceAddress, TunnelConfig};

/// Default interface MTU when the config does not set one
pub const DEFAULT_MTU: u32 = 1420;

/// Host-side network parameters derived from a validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Addresses to assign to the tunnel interface
    pub addresses: Vec<InterfaceAddress>,
    /// Routes to install through the interface
    pub routes: Vec<IpNetwork>,
    /// DNS servers to install while the tunnel is up
    pub dns: Vec<IpAddr>,
    /// Interface MTU
    pub mtu: u32,
}

/// Renders the engine settings text for a configuration.
///
/// The format is the flat `key=value` form the userspace WireGuard
/// implementations exchange over their UAPI socket. Peer endpoints come
/// from the resolved list, so the text never contains hostnames; a peer
/// whose slot is `None` simply gets no `endpoint=` line.
pub fn engine_settings(config: &TunnelConfig, resolved: &[Option<SocketAddr>]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "private_key={}\n",
        hex::encode(config.interface.private_key.to_bytes())
    ));
    if let Some(port) = config.interface.listen_port {
        out.push_str(&format!("listen_port={}\n", port));
    }
    out.push_str("replace_peers=true\n");

    for (peer, endpoint) in config.peers.iter().zip(resolved) {
        out.push_str(&format!(
            "public_key={}\n",
            hex::encode(peer.public_key.as_bytes())
        ));
        if let Some(psk) = &peer.preshared_key {
            out.push_str(&format!("preshared_key={}\n", hex::encode(psk)));
        }
        if let Some(addr) = endpoint {
            out.push_str(&format!("endpoint={}\n", addr));
        }
        if let Some(interval) = peer.persistent_keepalive {
            out.push_str(&format!("persistent_keepalive_interval={}\n", interval));
        }
        out.push_str("replace_allowed_ips=true\n");
        for network in &peer.allowed_ips {
            out.push_str(&format!("allowed_ip={}\n", network));
        }
    }

    out
}

/// Derives the host network settings for a configuration.
pub fn network_settings(config: &TunnelConfig) -> NetworkSettings {
    let addresses = config.interface.addresses.clone();
    let mut routes: Vec<IpNetwork> = Vec::new();

    for peer in &config.peers {
        for allowed in &peer.allowed_ips {
            if is_connected_network(&addresses, allowed) {
                // The kernel installs the connected route when the
                // address is assigned.
                continue;
            }
            if !routes.contains(allowed) {
                routes.push(*allowed);
            }
        }
    }

    NetworkSettings {
        addresses,
        routes,
        dns: config.interface.dns.clone(),
        mtu: config.interface.mtu.unwrap_or(DEFAULT_MTU),
    }
}

fn is_connected_network(addresses: &[InterfaceAddress], network: &IpNetwork) -> bool {
    addresses
        .iter()
        .filter_map(InterfaceAddress::network)
        .any(|connected| connected == *network)
}
