use std::net::IpAddr;

use ip_network_table::IpNetworkTable;

use super::uapi::EnginePeer;

/// Maps destination IPs to peer indices.
///
/// Longest-prefix matching over every peer's allowed IPs decides which
/// session an outbound packet is encrypted for.
pub(crate) struct AllowedIpsRouter {
    table: IpNetworkTable<usize>,
}

impl AllowedIpsRouter {
    pub fn new(peers: &[EnginePeer]) -> Self {
        let mut table = IpNetworkTable::new();
        for (idx, peer) in peers.iter().enumerate() {
            for network in &peer.allowed_ips {
                table.insert(*network, idx);
            }
        }
        Self { table }
    }

    pub fn lookup(&self, dest: IpAddr) -> Option<usize> {
        self.table.longest_match(dest).map(|(_, idx)| *idx)
    }
}

/// Extract the destination address from an IP packet.
pub(crate) fn extract_dest_ip(packet: &[u8]) -> Option<IpAddr> {
    if packet.is_empty() {
        return None;
    }

    match (packet[0] >> 4) & 0x0f {
        4 => {
            if packet.len() < 20 {
                return None;
            }
            Some(IpAddr::V4(std::net::Ipv4Addr::new(
                packet[16], packet[17], packet[18], packet[19],
            )))
        }
        6 => {
            if packet.len() < 40 {
                return None;
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&packet[24..40]);
            Some(IpAddr::V6(std::net::Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Extract the source address from an IP packet.
pub(crate) fn extract_src_ip(packet: &[u8]) -> Option<IpAddr> {
    if packet.is_empty() {
        return None;
    }

    match (packet[0] >> 4) & 0x0f {
        4 => {
            if packet.len() < 20 {
                return None;
            }
            Some(IpAddr::V4(std::net::Ipv4Addr::new(
                packet[12], packet[13], packet[14], packet[15],
            )))
        }
        6 => {
            if packet.len() < 40 {
                return None;
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&packet[8..24]);
            Some(IpAddr::V6(std::net::Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x25519_dalek::PublicKey;

    fn peer_with_allowed(allowed: &[&str]) -> EnginePeer {
        EnginePeer {
            public_key: PublicKey::from([0u8; 32]),
            preshared_key: None,
            endpoint: None,
            persistent_keepalive: None,
            allowed_ips: allowed.iter().map(|s| s.parse().unwrap()).collect(),
        }
    }

    #[test]
    fn test_extract_dest_ip_v4() {
        let mut packet = [0u8; 20];
        packet[0] = 0x45;
        packet[16] = 10;
        packet[19] = 1;

        let dest = extract_dest_ip(&packet).unwrap();
        assert_eq!(dest, "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_extract_src_ip_v4() {
        let mut packet = [0u8; 20];
        packet[0] = 0x45;
        packet[12] = 192;
        packet[13] = 168;
        packet[14] = 1;
        packet[15] = 1;

        let src = extract_src_ip(&packet).unwrap();
        assert_eq!(src, "192.168.1.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_extract_rejects_short_and_unknown() {
        assert_eq!(extract_dest_ip(&[]), None);
        assert_eq!(extract_dest_ip(&[0x45u8; 8]), None);
        assert_eq!(extract_dest_ip(&[0x00u8; 20]), None);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let peers = [
            peer_with_allowed(&["0.0.0.0/0"]),
            peer_with_allowed(&["10.0.0.0/24"]),
        ];
        let router = AllowedIpsRouter::new(&peers);

        assert_eq!(router.lookup("10.0.0.7".parse().unwrap()), Some(1));
        assert_eq!(router.lookup("192.168.1.1".parse().unwrap()), Some(0));
        assert_eq!(router.lookup("fd00::1".parse().unwrap()), None);
    }
}
