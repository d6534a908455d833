use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::{engine_settings, network_settings, ConfigProvider};
use crate::engine::{Engine, EngineHandle};
use crate::platform::{NetworkConfigurator, PacketChannel};
use crate::proto::{FaultCode, Request, Response, WireMessage};
use crate::resolver::EndpointResolver;

use super::{StopReason, TunnelHost};

/// Mutable host state, guarded by one lock.
///
/// The lock is only ever held for field access, never across a
/// collaborator call, so control messages stay responsive while a
/// start attempt is in flight.
#[derive(Default)]
struct HostState {
    last_error: FaultCode,
    engine: Option<EngineHandle>,
}

/// The tunnel host control plane.
///
/// Owns no platform machinery itself; everything observable happens
/// through the injected collaborators.
pub struct PacketTunnel {
    config: Arc<dyn ConfigProvider>,
    resolver: Arc<dyn EndpointResolver>,
    engine: Arc<dyn Engine>,
    network: Arc<dyn NetworkConfigurator>,
    channel: Arc<dyn PacketChannel>,
    state: Mutex<HostState>,
}

impl PacketTunnel {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        resolver: Arc<dyn EndpointResolver>,
        engine: Arc<dyn Engine>,
        network: Arc<dyn NetworkConfigurator>,
        channel: Arc<dyn PacketChannel>,
    ) -> Self {
        Self {
            config,
            resolver,
            engine,
            network,
            channel,
            state: Mutex::new(HostState::default()),
        }
    }

    /// Record a start failure and hand the same fault back.
    async fn fail(&self, fault: FaultCode) -> FaultCode {
        self.state.lock().await.last_error = fault.clone();
        fault
    }
}

#[async_trait]
impl TunnelHost for PacketTunnel {
    async fn start(&self) -> Result<(), FaultCode> {
        info!("starting tunnel");

        let config = match self.config.load() {
            Some(config) => config,
            None => {
                error!("saved configuration is missing or invalid");
                return Err(self.fail(FaultCode::InvalidSavedConfiguration).await);
            }
        };

        let endpoints = config.endpoints();
        let resolved = match self.resolver.resolve(&endpoints).await {
            Ok(resolved) => resolved,
            Err(failure) => {
                error!("endpoint resolution failed: {}", failure);
                return Err(self
                    .fail(FaultCode::DnsResolutionFailed {
                        hostnames: failure.hostnames,
                    })
                    .await);
            }
        };
        debug_assert_eq!(endpoints.len(), resolved.len());

        let settings = engine_settings(&config, &resolved);
        let net_settings = network_settings(&config);

        let descriptor = self.channel.descriptor();
        if descriptor < 0 {
            error!("packet channel produced no usable descriptor");
            return Err(self.fail(FaultCode::EngineStartFailed).await);
        }

        let interface = self.channel.interface_name().to_string();
        let handle = match self.engine.start(&interface, &settings, descriptor).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("engine refused to start: {}", e);
                return Err(self.fail(FaultCode::EngineStartFailed).await);
            }
        };
        debug!("engine instance {} started for {}", handle, interface);

        // Publish the handle before the settings round trip so a stop
        // arriving mid-apply can already see the running engine.
        self.state.lock().await.engine = Some(handle);

        if let Err(e) = self.network.apply(&interface, &net_settings).await {
            error!("network settings were rejected: {}", e);
            return Err(self.fail(FaultCode::NetworkSettingsRejected).await);
        }

        info!("tunnel up on {}", interface);
        Ok(())
    }

    async fn stop(&self, reason: StopReason) {
        info!(?reason, "stopping tunnel");
        let handle = self.state.lock().await.engine.take();
        match handle {
            Some(handle) => self.engine.stop(handle).await,
            None => debug!("no engine instance running, nothing to stop"),
        }
    }

    async fn handle_message(&self, data: &[u8]) -> Option<Vec<u8>> {
        let request = Request::from_bytes(data)?;
        match request {
            Request::RetrieveLastError => {
                let last_error = self.state.lock().await.last_error.clone();
                debug!("reporting last error: {}", last_error);
                Some(Response::LastError(last_error).to_bytes())
            }
        }
    }
}
