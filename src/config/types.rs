use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ip_network::IpNetwork;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::ConfigError;

/// Complete validated tunnel configuration
#[derive(Clone)]
pub struct TunnelConfig {
    pub interface: InterfaceConfig,
    pub peers: Vec<PeerConfig>,
}

impl fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("interface", &"<InterfaceConfig>")
            .field("peers", &self.peers)
            .finish()
    }
}

impl TunnelConfig {
    /// Configured endpoint of every peer, in peer order.
    pub fn endpoints(&self) -> Vec<Option<Endpoint>> {
        self.peers.iter().map(|p| p.endpoint.clone()).collect()
    }
}

/// [Interface] section configuration
#[derive(Clone)]
pub struct InterfaceConfig {
    /// Private key for this interface
    pub private_key: StaticSecret,
    /// IP addresses to assign to the interface (e.g., 10.0.0.2/24)
    pub addresses: Vec<InterfaceAddress>,
    /// UDP listen port (None = random port selection)
    pub listen_port: Option<u16>,
    /// DNS servers to install while the tunnel is up
    pub dns: Vec<IpAddr>,
    /// MTU setting (None = default)
    pub mtu: Option<u32>,
    /// Interface name (None = kernel-assigned)
    pub name: Option<String>,
}

impl fmt::Debug for InterfaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceConfig")
            .field("addresses", &self.addresses)
            .field("listen_port", &self.listen_port)
            .field("mtu", &self.mtu)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            private_key: StaticSecret::random_from_rng(rand::rngs::OsRng),
            addresses: Vec::new(),
            listen_port: None,
            dns: Vec::new(),
            mtu: None,
            name: None,
        }
    }
}

/// An address assigned to the interface, host bits preserved.
///
/// Distinct from [`IpNetwork`]: `10.0.0.2/24` is a valid interface
/// address but not a valid network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ip: IpAddr,
    pub prefix: u8,
}

impl InterfaceAddress {
    pub fn new(ip: IpAddr, prefix: u8) -> Result<Self, ConfigError> {
        let max = match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(ConfigError::InvalidAddress(format!("{ip}/{prefix}")));
        }
        Ok(Self { ip, prefix })
    }

    /// The connected network this address implies.
    pub fn network(&self) -> Option<IpNetwork> {
        IpNetwork::new_truncate(self.ip, self.prefix).ok()
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix)
    }
}

impl FromStr for InterfaceAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ip, prefix)) => {
                let ip: IpAddr = ip
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidAddress(s.to_string()))?;
                let prefix: u8 = prefix
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidAddress(s.to_string()))?;
                Self::new(ip, prefix)
            }
            None => {
                let ip: IpAddr = s
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidAddress(s.to_string()))?;
                let prefix = match ip {
                    IpAddr::V4(_) => 32,
                    IpAddr::V6(_) => 128,
                };
                Ok(Self { ip, prefix })
            }
        }
    }
}

/// [Peer] section configuration
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Public key of this peer
    pub public_key: PublicKey,
    /// Optional preshared key for additional symmetric encryption
    pub preshared_key: Option<[u8; 32]>,
    /// Remote endpoint as written in the config, unresolved
    pub endpoint: Option<Endpoint>,
    /// IP ranges allowed through this peer (routing + ACL)
    pub allowed_ips: Vec<IpNetwork>,
    /// Keepalive interval in seconds
    pub persistent_keepalive: Option<u16>,
}

impl PeerConfig {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            preshared_key: None,
            endpoint: None,
            allowed_ips: Vec::new(),
            persistent_keepalive: None,
        }
    }
}

/// A peer endpoint before DNS resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: Host,
    pub port: u16,
}

/// Endpoint host part: an IP literal or a name needing resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Ip(IpAddr),
    Name(String),
}

impl Endpoint {
    /// The hostname, when this endpoint needs DNS resolution.
    pub fn hostname(&self) -> Option<&str> {
        match &self.host {
            Host::Ip(_) => None,
            Host::Name(name) => Some(name),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ip(IpAddr::V6(ip)) => write!(f, "[{}]:{}", ip, self.port),
            Host::Ip(IpAddr::V4(ip)) => write!(f, "{}:{}", ip, self.port),
            Host::Name(name) => write!(f, "{}:{}", name, self.port),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ConfigError::InvalidEndpoint(s.to_string());

        // Bracketed IPv6 form: [::1]:51820
        if let Some(rest) = s.strip_prefix('[') {
            let (host, port) = rest.split_once(']').ok_or_else(invalid)?;
            let port = port.strip_prefix(':').ok_or_else(invalid)?;
            let ip: IpAddr = host.parse().map_err(|_| invalid())?;
            let port: u16 = port.parse().map_err(|_| invalid())?;
            return Ok(Endpoint {
                host: Host::Ip(ip),
                port,
            });
        }

        // host:port, splitting at the last colon
        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if host.is_empty() {
            return Err(invalid());
        }
        match host.parse::<IpAddr>() {
            Ok(ip) => Ok(Endpoint {
                host: Host::Ip(ip),
                port,
            }),
            Err(_) => {
                if host.contains([' ', '[', ']', '/']) {
                    return Err(invalid());
                }
                Ok(Endpoint {
                    host: Host::Name(host.to_string()),
                    port,
                })
            }
        }
    }
}
