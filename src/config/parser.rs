use std::net::IpAddr;
use std::path::Path;

use base64::prelude::*;
use ini::Ini;
use ip_network::IpNetwork;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{ConfigError, Result};

use super::types::{Endpoint, InterfaceAddress, InterfaceConfig, PeerConfig, TunnelConfig};

/// Parse a tunnel configuration file in wg-quick INI format
pub fn parse_config_file<P: AsRef<Path>>(path: P) -> Result<TunnelConfig> {
    let text = std::fs::read_to_string(path).map_err(ConfigError::File)?;
    parse_config_str(&text)
}

/// Parse a tunnel configuration from a string
pub fn parse_config_str(text: &str) -> Result<TunnelConfig> {
    let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let mut interface: Option<InterfaceConfig> = None;
    let mut peers: Vec<PeerConfig> = Vec::new();

    for (section, props) in ini.iter() {
        match section {
            Some("Interface") => {
                interface = Some(parse_interface_section(props)?);
            }
            Some("Peer") => {
                peers.push(parse_peer_section(props)?);
            }
            _ => {
                // Ignore unknown sections
            }
        }
    }

    let interface = interface.ok_or(ConfigError::MissingField("Interface section"))?;

    Ok(TunnelConfig { interface, peers })
}

fn parse_interface_section(props: &ini::Properties) -> Result<InterfaceConfig> {
    let private_key = props
        .get("PrivateKey")
        .ok_or(ConfigError::MissingField("PrivateKey"))?;
    let private_key = StaticSecret::from(decode_key("private key", private_key)?);

    let addresses = props
        .get("Address")
        .map(parse_interface_address_list)
        .transpose()?
        .unwrap_or_default();

    let listen_port = props
        .get("ListenPort")
        .map(|s| {
            s.parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(s.to_string()))
        })
        .transpose()?;

    let dns = props
        .get("DNS")
        .map(parse_dns_list)
        .transpose()?
        .unwrap_or_default();

    let mtu = props
        .get("MTU")
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| ConfigError::Parse(format!("Invalid MTU: {}", s)))
        })
        .transpose()?;

    Ok(InterfaceConfig {
        private_key,
        addresses,
        listen_port,
        dns,
        mtu,
        name: None,
    })
}

fn parse_peer_section(props: &ini::Properties) -> Result<PeerConfig> {
    let public_key = props
        .get("PublicKey")
        .ok_or(ConfigError::MissingField("PublicKey"))?;
    let public_key = PublicKey::from(decode_key("public key", public_key)?);

    let preshared_key = props
        .get("PresharedKey")
        .map(|s| decode_key("preshared key", s))
        .transpose()?;

    let endpoint = props
        .get("Endpoint")
        .map(|s| s.parse::<Endpoint>())
        .transpose()?;

    let allowed_ips = props
        .get("AllowedIPs")
        .map(parse_allowed_ips)
        .transpose()?
        .unwrap_or_default();

    let persistent_keepalive = props
        .get("PersistentKeepalive")
        .map(|s| {
            s.parse::<u16>()
                .map_err(|_| ConfigError::Parse(format!("Invalid PersistentKeepalive: {}", s)))
        })
        .transpose()?;

    Ok(PeerConfig {
        public_key,
        preshared_key,
        endpoint,
        allowed_ips,
        persistent_keepalive,
    })
}

/// Decode a base64-encoded 32-byte key
fn decode_key(what: &str, s: &str) -> Result<[u8; 32]> {
    let bytes = BASE64_STANDARD
        .decode(s.trim())
        .map_err(|e| ConfigError::InvalidKey(format!("Invalid base64 {}: {}", what, e)))?;

    let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
        ConfigError::InvalidKey(format!(
            "{} must be 32 bytes, got {}",
            what,
            bytes.len()
        ))
    })?;

    Ok(key)
}

/// Parse a comma-separated list of interface addresses, host bits kept
fn parse_interface_address_list(s: &str) -> Result<Vec<InterfaceAddress>> {
    s.split(',')
        .map(|addr| addr.trim().parse::<InterfaceAddress>().map_err(Into::into))
        .collect()
}

/// Parse a comma-separated AllowedIPs list, truncating to network bounds
fn parse_allowed_ips(s: &str) -> Result<Vec<IpNetwork>> {
    s.split(',')
        .map(|entry| {
            let entry = entry.trim();
            // Reuse the address grammar, then drop the host bits.
            let addr: InterfaceAddress = entry.parse()?;
            IpNetwork::new_truncate(addr.ip, addr.prefix)
                .map_err(|_| ConfigError::InvalidAddress(entry.to_string()).into())
        })
        .collect()
}

/// Parse a comma-separated list of DNS servers
fn parse_dns_list(s: &str) -> Result<Vec<IpAddr>> {
    s.split(',')
        .map(|addr| {
            addr.trim()
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidAddress(addr.to_string()).into())
        })
        .collect()
}

/// Encode a key to base64
pub fn encode_key(key: &[u8; 32]) -> String {
    BASE64_STANDARD.encode(key)
}

/// Generate a new private key
pub fn generate_private_key() -> StaticSecret {
    StaticSecret::random_from_rng(rand::rngs::OsRng)
}

/// Derive public key from private key
pub fn derive_public_key(private_key: &StaticSecret) -> PublicKey {
    PublicKey::from(private_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Host;

    const SAMPLE: &str = r#"
[Interface]
PrivateKey = GCLXF8t5oLYobnm8ZSakEhG1LC0UOAbCoBXcLDllHEE=
Address = 10.0.0.2/24, fd00::2/64
ListenPort = 51820
DNS = 10.0.0.1, 1.1.1.1
MTU = 1380

[Peer]
PublicKey = bkwMXicPRuK1BV5TKggYJvTIGVDphEUCbmbSQNbOnm8=
PresharedKey = GCLXF8t5oLYobnm8ZSakEhG1LC0UOAbCoBXcLDllHEE=
Endpoint = vpn.example.net:51820
AllowedIPs = 0.0.0.0/0
PersistentKeepalive = 25

[Peer]
PublicKey = bkwMXicPRuK1BV5TKggYJvTIGVDphEUCbmbSQNbOnm8=
Endpoint = 203.0.113.4:51820
AllowedIPs = 10.0.1.0/24, 10.0.2.0/24
"#;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config_str(SAMPLE).unwrap();
        assert_eq!(config.interface.addresses.len(), 2);
        assert_eq!(config.interface.listen_port, Some(51820));
        assert_eq!(config.interface.dns.len(), 2);
        assert_eq!(config.interface.mtu, Some(1380));
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.peers[0].persistent_keepalive, Some(25));
        assert!(config.peers[0].preshared_key.is_some());
        assert!(config.peers[1].preshared_key.is_none());
    }

    #[test]
    fn test_interface_address_keeps_host_bits() {
        let addrs = parse_interface_address_list("10.0.0.2/24").unwrap();
        assert_eq!(addrs[0].ip, "10.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(addrs[0].prefix, 24);
        assert_eq!(addrs[0].network().unwrap().to_string(), "10.0.0.0/24");
    }

    #[test]
    fn test_parse_address_without_cidr() {
        let addrs = parse_interface_address_list("10.0.0.1").unwrap();
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].prefix, 32);

        let addrs = parse_interface_address_list("fd00::1").unwrap();
        assert_eq!(addrs[0].prefix, 128);
    }

    #[test]
    fn test_allowed_ips_are_truncated() {
        let nets = parse_allowed_ips("10.0.0.5/24, 192.168.0.0/16").unwrap();
        assert_eq!(nets[0].to_string(), "10.0.0.0/24");
        assert_eq!(nets[1].to_string(), "192.168.0.0/16");
    }

    #[test]
    fn test_parse_endpoint_forms() {
        let ep: Endpoint = "192.168.1.1:51820".parse().unwrap();
        assert_eq!(ep.port, 51820);
        assert!(ep.hostname().is_none());

        let ep: Endpoint = "[fd00::1]:51820".parse().unwrap();
        assert_eq!(ep.port, 51820);
        assert_eq!(ep.to_string(), "[fd00::1]:51820");

        let ep: Endpoint = "vpn.example.net:51820".parse().unwrap();
        assert_eq!(ep.hostname(), Some("vpn.example.net"));
        assert_eq!(ep.host, Host::Name("vpn.example.net".to_string()));
    }

    #[test]
    fn test_parse_endpoint_rejects_garbage() {
        assert!("no-port.example".parse::<Endpoint>().is_err());
        assert!(":51820".parse::<Endpoint>().is_err());
        assert!("[fd00::1]51820".parse::<Endpoint>().is_err());
        assert!("host.example:notaport".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_missing_interface_section() {
        let result = parse_config_str("[Peer]\nPublicKey = bad\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_private_key() {
        let result = parse_config_str("[Interface]\nAddress = 10.0.0.1/24\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_key_length_is_checked() {
        assert!(decode_key("private key", "dG9vc2hvcnQ=").is_err());
        assert!(decode_key("private key", "!!! not base64 !!!").is_err());
    }
}
