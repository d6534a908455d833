use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

use super::event_loop::{self, DataPlane};
use super::router::AllowedIpsRouter;
use super::session::Session;
use super::tun_io::TunIo;
use super::{uapi, Engine, EngineHandle, EngineLogger};

/// Userspace WireGuard engine built on boringtun.
///
/// Each started instance runs its own event loop task; the registry
/// maps handles to the running tasks so `stop` can tear them down.
pub struct BoringEngine {
    logger: EngineLogger,
    tunnels: Mutex<HashMap<i32, RunningTunnel>>,
    next_handle: AtomicI32,
}

struct RunningTunnel {
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
}

impl BoringEngine {
    pub fn new(logger: EngineLogger) -> Self {
        Self {
            logger,
            tunnels: Mutex::new(HashMap::new()),
            next_handle: AtomicI32::new(1),
        }
    }
}

#[async_trait]
impl Engine for BoringEngine {
    async fn start(
        &self,
        interface: &str,
        settings: &str,
        descriptor: RawFd,
    ) -> Result<EngineHandle, EngineError> {
        // Own the descriptor first so every failure path closes it.
        let tun = TunIo::from_raw_fd(descriptor).map_err(EngineError::Descriptor)?;

        let config = uapi::parse(settings)?;

        let mut sessions = Vec::with_capacity(config.peers.len());
        for (idx, peer) in config.peers.iter().enumerate() {
            sessions.push(Session::new(&config.private_key, peer, idx as u32)?);
        }
        let router = AllowedIpsRouter::new(&config.peers);

        let udp = bind_udp(config.listen_port.unwrap_or(0), &self.logger)
            .await
            .map_err(EngineError::Bind)?;

        let shutdown = CancellationToken::new();
        let plane = DataPlane {
            tun,
            udp,
            sessions,
            router,
        };
        let worker = tokio::spawn(event_loop::run(plane, self.logger.clone(), shutdown.clone()));

        let handle = EngineHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.tunnels
            .lock()
            .await
            .insert(handle.raw(), RunningTunnel { shutdown, worker });

        self.logger.info(&format!(
            "instance {} running on {} with {} peers",
            handle,
            interface,
            config.peers.len()
        ));
        Ok(handle)
    }

    async fn stop(&self, handle: EngineHandle) {
        let running = self.tunnels.lock().await.remove(&handle.raw());
        match running {
            Some(running) => {
                running.shutdown.cancel();
                if running.worker.await.is_err() {
                    self.logger
                        .error(&format!("instance {} worker panicked during shutdown", handle));
                } else {
                    self.logger.info(&format!("instance {} stopped", handle));
                }
            }
            None => {
                self.logger
                    .verbose(&format!("stop for unknown handle {}, ignoring", handle));
            }
        }
    }
}

/// Bind the tunnel socket, dual-stack when the host allows it.
async fn bind_udp(port: u16, logger: &EngineLogger) -> io::Result<UdpSocket> {
    let v6 = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0);
    match UdpSocket::bind(v6).await {
        Ok(socket) => {
            if let Ok(addr) = socket.local_addr() {
                logger.verbose(&format!("listening on {}", addr));
            }
            Ok(socket)
        }
        Err(e) => {
            logger.verbose(&format!("IPv6 bind failed ({}), trying IPv4", e));
            let v4 = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
            let socket = UdpSocket::bind(v4).await?;
            if let Ok(addr) = socket.local_addr() {
                logger.verbose(&format!("listening on {}", addr));
            }
            Ok(socket)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::fd::FromRawFd;

    fn settings(peers: usize) -> String {
        let mut text = format!("private_key={}\n", hex::encode([0x11u8; 32]));
        for n in 0..peers {
            text.push_str(&format!("public_key={}\n", hex::encode([0x20 + n as u8; 32])));
            text.push_str("allowed_ip=10.0.0.0/24\n");
        }
        text
    }

    fn tun_stand_in() -> (RawFd, File) {
        // A pipe read end behaves like a quiet tunnel descriptor.
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        (fds[0], unsafe { File::from_raw_fd(fds[1]) })
    }

    #[tokio::test]
    async fn test_start_and_stop_instance() {
        let engine = BoringEngine::new(EngineLogger::disabled());
        let (fd, _write_end) = tun_stand_in();

        let handle = engine.start("wg-test", &settings(1), fd).await.unwrap();
        assert!(handle.raw() > 0);

        engine.stop(handle).await;
        assert!(engine.tunnels.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let engine = BoringEngine::new(EngineLogger::disabled());
        let (fd_a, _keep_a) = tun_stand_in();
        let (fd_b, _keep_b) = tun_stand_in();

        let first = engine.start("wg-a", &settings(1), fd_a).await.unwrap();
        let second = engine.start("wg-b", &settings(2), fd_b).await.unwrap();
        assert_ne!(first, second);

        engine.stop(first).await;
        engine.stop(second).await;
    }

    #[tokio::test]
    async fn test_stop_unknown_handle_is_noop() {
        let engine = BoringEngine::new(EngineLogger::disabled());
        engine.stop(EngineHandle::new(99)).await;
    }

    #[tokio::test]
    async fn test_start_rejects_bad_input() {
        let engine = BoringEngine::new(EngineLogger::disabled());

        assert!(matches!(
            engine.start("wg-test", &settings(1), -1).await,
            Err(EngineError::Descriptor(_))
        ));

        let (fd, _keep) = tun_stand_in();
        assert!(matches!(
            engine.start("wg-test", "garbage settings", fd).await,
            Err(EngineError::InvalidSettings(_))
        ));
    }
}
