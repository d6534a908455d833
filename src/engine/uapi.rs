//! Parser for the flat `key=value` settings text.
//!
//! The grammar follows the cross-implementation userspace interface:
//! interface-scoped keys first, then one block per peer introduced by
//! `public_key`. Keys are hex, not base64. Unknown keys are rejected so
//! a malformed settings text fails the start instead of partially
//! configuring the tunnel.

use std::net::{IpAddr, SocketAddr};

use ip_network::IpNetwork;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::EngineError;

pub(crate) struct EngineConfig {
    pub private_key: StaticSecret,
    pub listen_port: Option<u16>,
    pub peers: Vec<EnginePeer>,
}

pub(crate) struct EnginePeer {
    pub public_key: PublicKey,
    pub preshared_key: Option<[u8; 32]>,
    pub endpoint: Option<SocketAddr>,
    pub persistent_keepalive: Option<u16>,
    pub allowed_ips: Vec<IpNetwork>,
}

impl EnginePeer {
    fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            preshared_key: None,
            endpoint: None,
            persistent_keepalive: None,
            allowed_ips: Vec::new(),
        }
    }
}

fn malformed(detail: String) -> EngineError {
    EngineError::InvalidSettings(detail)
}

pub(crate) fn parse(text: &str) -> Result<EngineConfig, EngineError> {
    let mut private_key: Option<StaticSecret> = None;
    let mut listen_port: Option<u16> = None;
    let mut peers: Vec<EnginePeer> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| malformed(format!("line without '=': {}", line)))?;

        match key {
            "private_key" => {
                private_key = Some(StaticSecret::from(key_bytes(value)?));
            }
            "listen_port" => {
                listen_port = Some(number(value, "listen_port")?);
            }
            "replace_peers" => {
                // Whole-config replacement is the only supported mode.
            }
            "public_key" => {
                peers.push(EnginePeer::new(PublicKey::from(key_bytes(value)?)));
            }
            _ => {
                let peer = peers.last_mut().ok_or_else(|| {
                    malformed(format!("peer attribute before any public_key: {}", key))
                })?;
                match key {
                    "preshared_key" => peer.preshared_key = Some(key_bytes(value)?),
                    "endpoint" => {
                        peer.endpoint = Some(
                            value
                                .parse()
                                .map_err(|_| malformed(format!("bad endpoint: {}", value)))?,
                        );
                    }
                    "persistent_keepalive_interval" => {
                        peer.persistent_keepalive = Some(number(value, key)?);
                    }
                    "replace_allowed_ips" => {}
                    "allowed_ip" => peer.allowed_ips.push(allowed_ip(value)?),
                    _ => return Err(malformed(format!("unknown key: {}", key))),
                }
            }
        }
    }

    let private_key = private_key.ok_or_else(|| malformed("missing private_key".to_string()))?;

    Ok(EngineConfig {
        private_key,
        listen_port,
        peers,
    })
}

fn key_bytes(value: &str) -> Result<[u8; 32], EngineError> {
    let bytes = hex::decode(value).map_err(|_| malformed(format!("bad hex key: {}", value)))?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| malformed(format!("key must be 32 bytes, got {}", bytes.len())))
}

fn number(value: &str, key: &str) -> Result<u16, EngineError> {
    value
        .parse()
        .map_err(|_| malformed(format!("bad {}: {}", key, value)))
}

fn allowed_ip(value: &str) -> Result<IpNetwork, EngineError> {
    let (ip, prefix) = value
        .split_once('/')
        .ok_or_else(|| malformed(format!("allowed_ip without prefix: {}", value)))?;
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| malformed(format!("bad allowed_ip: {}", value)))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| malformed(format!("bad allowed_ip prefix: {}", value)))?;
    IpNetwork::new_truncate(ip, prefix).map_err(|_| malformed(format!("bad allowed_ip: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        format!(
            "private_key={}\n\
             listen_port=51820\n\
             replace_peers=true\n\
             public_key={}\n\
             preshared_key={}\n\
             endpoint=203.0.113.4:51820\n\
             persistent_keepalive_interval=25\n\
             replace_allowed_ips=true\n\
             allowed_ip=0.0.0.0/0\n\
             public_key={}\n\
             replace_allowed_ips=true\n\
             allowed_ip=10.0.1.0/24\n\
             allowed_ip=fd00::/64\n",
            hex::encode([0x11u8; 32]),
            hex::encode([0x22u8; 32]),
            hex::encode([0x33u8; 32]),
            hex::encode([0x44u8; 32]),
        )
    }

    #[test]
    fn test_parse_full_settings() {
        let config = parse(&sample()).unwrap();
        assert_eq!(config.listen_port, Some(51820));
        assert_eq!(config.peers.len(), 2);

        let first = &config.peers[0];
        assert_eq!(first.public_key.as_bytes(), &[0x22u8; 32]);
        assert_eq!(first.preshared_key, Some([0x33u8; 32]));
        assert_eq!(first.endpoint, Some("203.0.113.4:51820".parse().unwrap()));
        assert_eq!(first.persistent_keepalive, Some(25));
        assert_eq!(first.allowed_ips.len(), 1);

        let second = &config.peers[1];
        assert!(second.endpoint.is_none());
        assert_eq!(second.allowed_ips.len(), 2);
    }

    #[test]
    fn test_missing_private_key() {
        let text = format!("public_key={}\n", hex::encode([0x22u8; 32]));
        assert!(parse(&text).is_err());
    }

    #[test]
    fn test_peer_attribute_before_public_key() {
        let text = format!(
            "private_key={}\nallowed_ip=10.0.0.0/24\n",
            hex::encode([0x11u8; 32])
        );
        assert!(parse(&text).is_err());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let text = format!(
            "private_key={}\nfwmark=32\n",
            hex::encode([0x11u8; 32])
        );
        assert!(parse(&text).is_err());
    }

    #[test]
    fn test_bad_values_are_rejected() {
        assert!(parse("private_key=nothex\n").is_err());
        assert!(parse(&format!("private_key={}\n", hex::encode([1u8; 16]))).is_err());
        assert!(parse(&format!(
            "private_key={}\nlisten_port=99999\n",
            hex::encode([0x11u8; 32])
        ))
        .is_err());
        assert!(parse("no equals sign").is_err());
    }

    #[test]
    fn test_ipv6_endpoint() {
        let text = format!(
            "private_key={}\npublic_key={}\nendpoint=[fd00::1]:51820\n",
            hex::encode([0x11u8; 32]),
            hex::encode([0x22u8; 32]),
        );
        let config = parse(&text).unwrap();
        assert_eq!(
            config.peers[0].endpoint,
            Some("[fd00::1]:51820".parse().unwrap())
        );
    }
}
