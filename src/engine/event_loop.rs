use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use boringtun::noise::TunnResult;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::router::{extract_dest_ip, extract_src_ip, AllowedIpsRouter};
use super::session::Session;
use super::tun_io::TunIo;
use super::EngineLogger;

/// Maximum packet size (MTU + some overhead)
const MAX_PACKET_SIZE: usize = 65536;

/// Timer interval for keepalives/handshakes
const TIMER_INTERVAL_MS: u64 = 250;

/// Everything one tunnel instance needs to move packets.
pub(crate) struct DataPlane {
    pub tun: TunIo,
    pub udp: UdpSocket,
    pub sessions: Vec<Session>,
    pub router: AllowedIpsRouter,
}

/// Run one tunnel instance until the token is cancelled.
pub(crate) async fn run(mut plane: DataPlane, logger: EngineLogger, shutdown: CancellationToken) {
    let mut tun_buf = vec![0u8; MAX_PACKET_SIZE];
    let mut udp_buf = vec![0u8; MAX_PACKET_SIZE];
    let mut out_buf = vec![0u8; MAX_PACKET_SIZE];

    let mut timer = tokio::time::interval(Duration::from_millis(TIMER_INTERVAL_MS));

    initiate_handshakes(&mut plane.sessions, &plane.udp, &logger, &mut out_buf).await;

    logger.info("event loop started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                logger.info("event loop shutting down");
                break;
            }

            // Outbound: tunnel device -> network
            result = plane.tun.recv(&mut tun_buf) => {
                match result {
                    Ok(n) if n > 0 => {
                        handle_tun_packet(
                            &tun_buf[..n],
                            &mut plane.sessions,
                            &plane.router,
                            &plane.udp,
                            &logger,
                            &mut out_buf,
                        ).await;
                    }
                    Ok(_) => {}
                    Err(e) => logger.error(&format!("tunnel read error: {}", e)),
                }
            }

            // Inbound: network -> tunnel device
            result = plane.udp.recv_from(&mut udp_buf) => {
                match result {
                    Ok((n, src)) if n > 0 => {
                        handle_udp_packet(
                            &udp_buf[..n],
                            src,
                            &mut plane.sessions,
                            &plane.udp,
                            &plane.tun,
                            &logger,
                            &mut out_buf,
                        ).await;
                    }
                    Ok(_) => {}
                    Err(e) => logger.error(&format!("socket read error: {}", e)),
                }
            }

            _ = timer.tick() => {
                handle_timers(&mut plane.sessions, &plane.udp, &logger, &mut out_buf).await;
            }
        }
    }
}

/// Kick off handshakes for every peer with a known endpoint.
async fn initiate_handshakes(
    sessions: &mut [Session],
    udp: &UdpSocket,
    logger: &EngineLogger,
    out_buf: &mut [u8],
) {
    for (idx, session) in sessions.iter_mut().enumerate() {
        let endpoint = match session.endpoint() {
            Some(endpoint) => endpoint,
            None => continue,
        };
        match session.encapsulate(&[], out_buf) {
            TunnResult::WriteToNetwork(data) => {
                logger.verbose(&format!("initiating handshake with peer {} at {}", idx, endpoint));
                if let Err(e) = udp.send_to(data, endpoint).await {
                    logger.error(&format!("handshake send to {} failed: {}", endpoint, e));
                }
            }
            TunnResult::Err(e) => {
                logger.error(&format!("handshake initiation for peer {} failed: {:?}", idx, e));
            }
            _ => {}
        }
    }
}

async fn handle_tun_packet(
    packet: &[u8],
    sessions: &mut [Session],
    router: &AllowedIpsRouter,
    udp: &UdpSocket,
    logger: &EngineLogger,
    out_buf: &mut [u8],
) {
    let dest = match extract_dest_ip(packet) {
        Some(dest) => dest,
        None => {
            logger.verbose("outbound packet without a parseable destination, dropping");
            return;
        }
    };
    let idx = match router.lookup(dest) {
        Some(idx) => idx,
        None => {
            logger.verbose(&format!("no peer for destination {}, dropping", dest));
            return;
        }
    };
    let session = match sessions.get_mut(idx) {
        Some(session) => session,
        None => return,
    };
    let endpoint = session.endpoint();

    match session.encapsulate(packet, out_buf) {
        TunnResult::WriteToNetwork(data) => match endpoint {
            Some(endpoint) => {
                if let Err(e) = udp.send_to(data, endpoint).await {
                    logger.error(&format!("send to {} failed: {}", endpoint, e));
                }
            }
            None => logger.verbose(&format!("no endpoint for peer {}, dropping", idx)),
        },
        TunnResult::Done => {
            // Queued until the handshake completes.
        }
        TunnResult::Err(e) => {
            logger.error(&format!("encapsulation for peer {} failed: {:?}", idx, e));
        }
        _ => {}
    }
}

async fn handle_udp_packet(
    datagram: &[u8],
    src: SocketAddr,
    sessions: &mut [Session],
    udp: &UdpSocket,
    tun: &TunIo,
    logger: &EngineLogger,
    out_buf: &mut [u8],
) {
    if let Some(receiver) = receiver_index(datagram) {
        // Session indices carry the peer index in the upper 24 bits.
        let idx = (receiver >> 8) as usize;
        match sessions.get_mut(idx) {
            Some(session) => {
                if session.set_endpoint(src) {
                    logger.verbose(&format!("peer {} endpoint is now {}", idx, src));
                }
                process_session_packet(datagram, src, idx, session, udp, tun, logger, out_buf)
                    .await;
            }
            None => logger.verbose(&format!("unknown receiver index {:#x} from {}", receiver, src)),
        }
        return;
    }

    // Handshake initiations carry no receiver index; offer the packet
    // to each session until one accepts it.
    for idx in 0..sessions.len() {
        let session = &mut sessions[idx];
        let sent_response = match session.decapsulate(Some(src.ip()), datagram, out_buf) {
            TunnResult::WriteToNetwork(response) => {
                if let Err(e) = udp.send_to(response, src).await {
                    logger.error(&format!("handshake response to {} failed: {}", src, e));
                }
                true
            }
            TunnResult::WriteToTunnelV4(data, inner_src) => {
                deliver(tun, session, data, IpAddr::V4(inner_src), src, logger).await;
                false
            }
            TunnResult::WriteToTunnelV6(data, inner_src) => {
                deliver(tun, session, data, IpAddr::V6(inner_src), src, logger).await;
                false
            }
            TunnResult::Done => false,
            TunnResult::Err(_) => continue,
        };

        if session.set_endpoint(src) {
            logger.verbose(&format!("peer {} endpoint is now {}", idx, src));
        }
        if sent_response {
            flush_queue(session, src, udp, logger, out_buf).await;
        }
        return;
    }

    logger.verbose(&format!("no peer accepted packet from {}", src));
}

/// Handle a datagram already matched to a session.
async fn process_session_packet(
    datagram: &[u8],
    src: SocketAddr,
    idx: usize,
    session: &mut Session,
    udp: &UdpSocket,
    tun: &TunIo,
    logger: &EngineLogger,
    out_buf: &mut [u8],
) {
    let mut flush = false;
    match session.decapsulate(Some(src.ip()), datagram, out_buf) {
        TunnResult::WriteToNetwork(response) => {
            if let Err(e) = udp.send_to(response, src).await {
                logger.error(&format!("send to {} failed: {}", src, e));
                return;
            }
            flush = true;
        }
        TunnResult::WriteToTunnelV4(data, inner_src) => {
            deliver(tun, session, data, IpAddr::V4(inner_src), src, logger).await;
        }
        TunnResult::WriteToTunnelV6(data, inner_src) => {
            deliver(tun, session, data, IpAddr::V6(inner_src), src, logger).await;
        }
        TunnResult::Done => {}
        TunnResult::Err(e) => {
            logger.verbose(&format!("decapsulation from peer {} failed: {:?}", idx, e));
        }
    }
    if flush {
        flush_queue(session, src, udp, logger, out_buf).await;
    }
}

/// Drain packets queued behind a completed handshake. The docs ask for
/// repeated decapsulate calls with an empty datagram until Done.
async fn flush_queue(
    session: &mut Session,
    dst: SocketAddr,
    udp: &UdpSocket,
    logger: &EngineLogger,
    out_buf: &mut [u8],
) {
    loop {
        match session.decapsulate(None, &[], out_buf) {
            TunnResult::WriteToNetwork(data) => {
                if let Err(e) = udp.send_to(data, dst).await {
                    logger.error(&format!("queued send to {} failed: {}", dst, e));
                    return;
                }
            }
            _ => return,
        }
    }
}

/// Write a decrypted packet to the tunnel device after the
/// cryptokey-routing check.
async fn deliver(
    tun: &TunIo,
    session: &Session,
    data: &[u8],
    inner_src: IpAddr,
    src: SocketAddr,
    logger: &EngineLogger,
) {
    if !session.is_allowed_ip(inner_src) {
        logger.verbose(&format!(
            "dropping packet from {}: inner source {} not in allowed ips",
            src, inner_src
        ));
        return;
    }
    // A plausibility check on what we are about to hand the kernel.
    debug_assert!(extract_src_ip(data) == Some(inner_src) || extract_src_ip(data).is_none());
    if let Err(e) = tun.send(data).await {
        logger.error(&format!("tunnel write failed: {}", e));
    }
}

async fn handle_timers(
    sessions: &mut [Session],
    udp: &UdpSocket,
    logger: &EngineLogger,
    out_buf: &mut [u8],
) {
    for (idx, session) in sessions.iter_mut().enumerate() {
        let endpoint = session.endpoint();
        loop {
            match session.update_timers(out_buf) {
                TunnResult::WriteToNetwork(data) => {
                    if let Some(endpoint) = endpoint {
                        if let Err(e) = udp.send_to(data, endpoint).await {
                            logger.verbose(&format!(
                                "timer send to peer {} at {} failed: {}",
                                idx, endpoint, e
                            ));
                        }
                    }
                }
                TunnResult::Err(e) => {
                    logger.verbose(&format!("timer error for peer {}: {:?}", idx, e));
                    break;
                }
                _ => break,
            }
        }
    }
}

/// Receiver index of an inbound datagram, when its type carries one.
///
/// Handshake responses hold it at offset 8, cookie replies and data
/// packets at offset 4. Initiations have a sender index only.
fn receiver_index(datagram: &[u8]) -> Option<u32> {
    match datagram.first()? {
        2 if datagram.len() >= 12 => Some(u32::from_le_bytes([
            datagram[8],
            datagram[9],
            datagram[10],
            datagram[11],
        ])),
        3 | 4 if datagram.len() >= 8 => Some(u32::from_le_bytes([
            datagram[4],
            datagram[5],
            datagram[6],
            datagram[7],
        ])),
        _ => None,
    }
}
