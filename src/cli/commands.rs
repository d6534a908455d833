use base64::Engine;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::parser::{derive_public_key, encode_key, generate_private_key};
use crate::config::{parse_config_file, FileConfigStore};
use crate::control::{list_sockets, socket_path, ControlClient, ControlServer};
use crate::engine::{BoringEngine, EngineLogLevel, EngineLogger};
use crate::error::{ConfigError, HostError, Result};
use crate::host::{PacketTunnel, StopReason, TunnelHost};
use crate::platform::linux::{LinuxNetworkConfigurator, TunChannel};
use crate::platform::PacketChannel;
use crate::proto::FaultCode;
use crate::resolver::SystemResolver;

/// Execute the 'up' command
pub async fn cmd_up(
    config_path: Option<PathBuf>,
    interface: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let Some(config_path) = config_path else {
        return Err(HostError::Other(
            "Config file required. Use -c/--config to specify.".to_string(),
        ));
    };

    // An unreadable file is fatal here; the tunnel re-validates through
    // the provider on every start.
    let parsed = parse_config_file(&config_path)?;
    let iface_hint = interface.or_else(|| parsed.interface.name.clone());

    // The device is created first so its kernel-assigned name can seed
    // the control socket and the applied settings.
    let channel = Arc::new(TunChannel::create(iface_hint.as_deref(), parsed.interface.mtu)?);
    let iface = channel.interface_name().to_string();
    tracing::info!("Created TUN device: {}", iface);

    let provider = Arc::new(
        FileConfigStore::new(&config_path)
            .with_interface_name(Some(iface.clone()))
            .with_listen_port(port),
    );
    let network = Arc::new(LinuxNetworkConfigurator::new().await?);
    let resolver = Arc::new(SystemResolver::new());
    let engine = Arc::new(BoringEngine::new(engine_log_sink()));

    let host: Arc<dyn TunnelHost> = Arc::new(PacketTunnel::new(
        provider, resolver, engine, network, channel,
    ));

    let server = ControlServer::bind(&iface, Arc::clone(&host))?;

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received SIGINT, shutting down...");
        signal_shutdown.cancel();
    });

    let server_task = tokio::spawn(server.serve(shutdown.clone()));

    match host.start().await {
        Ok(()) => {
            let public_key = derive_public_key(&parsed.interface.private_key);
            tracing::info!(
                "Interface {} is up (public key {})",
                iface,
                encode_key(public_key.as_bytes())
            );
        }
        Err(fault @ FaultCode::NetworkSettingsRejected) => {
            // The engine is still running at this point. Leave the
            // tunnel up; routes can be added by hand and the fault
            // stays queryable over the control socket.
            tracing::warn!("{}; tunnel left up without routes", fault);
        }
        Err(fault) => {
            shutdown.cancel();
            server_task.await.ok();
            return Err(HostError::Start(fault));
        }
    }

    shutdown.cancelled().await;

    host.stop(StopReason::UserRequested).await;
    server_task.await.ok();
    tracing::info!("Interface {} is down", iface);

    Ok(())
}

/// Execute the 'down' command
pub async fn cmd_down(interface: String) -> Result<()> {
    let network = LinuxNetworkConfigurator::new().await?;
    network.link_down(&interface).await?;

    tracing::info!("Interface {} is down", interface);

    Ok(())
}

/// Execute the 'status' command
pub async fn cmd_status(interface: Option<String>) -> Result<()> {
    match interface {
        Some(iface) => print_status(&iface, &socket_path(&iface)).await,
        None => {
            let sockets = list_sockets();
            if sockets.is_empty() {
                println!("No running tunnels");
                return Ok(());
            }
            for (iface, path) in sockets {
                print_status(&iface, &path).await;
            }
        }
    }

    Ok(())
}

async fn print_status(iface: &str, path: &Path) {
    let mut client = match ControlClient::connect_path(path).await {
        Ok(client) => client,
        Err(_) => {
            println!("{}: not running", iface);
            return;
        }
    };

    match client.retrieve_last_error().await {
        Ok(FaultCode::NoError) => println!("{}: running ({})", iface, FaultCode::NoError),
        Ok(fault) => println!("{}: running (last failure: {})", iface, fault),
        Err(e) => println!("{}: running (status query failed: {})", iface, e),
    }
}

/// Execute the 'genkey' command
pub fn cmd_genkey() {
    let private_key = generate_private_key();
    let encoded = encode_key(&private_key.to_bytes());
    println!("{}", encoded);
}

/// Execute the 'pubkey' command
pub fn cmd_pubkey() -> Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();

    stdin
        .lock()
        .read_line(&mut line)
        .map_err(|e| HostError::Other(format!("Failed to read from stdin: {}", e)))?;

    let line = line.trim();
    let bytes = base64::prelude::BASE64_STANDARD
        .decode(line)
        .map_err(|e| ConfigError::InvalidKey(format!("Invalid base64: {}", e)))?;

    let key_bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
        ConfigError::InvalidKey(format!("Private key must be 32 bytes, got {}", v.len()))
    })?;

    let private_key = x25519_dalek::StaticSecret::from(key_bytes);
    let public_key = derive_public_key(&private_key);

    println!("{}", encode_key(public_key.as_bytes()));

    Ok(())
}

/// Show example configuration
pub fn cmd_show_config() {
    let example = r#"[Interface]
# Your private key (generate with: wgtund genkey)
PrivateKey = <base64-encoded-private-key>

# IP address(es) for this interface
Address = 10.0.0.2/24

# UDP listen port (optional, random if not specified)
ListenPort = 51820

# DNS servers (recorded in settings, not installed system-wide)
# DNS = 1.1.1.1, 8.8.8.8

# MTU (optional, default 1420)
# MTU = 1420

[Peer]
# Peer's public key
PublicKey = <base64-encoded-public-key>

# Peer's endpoint; hostnames are resolved at startup
Endpoint = server.example.com:51820

# IPs routed through this peer
AllowedIPs = 10.0.0.0/24, 192.168.1.0/24

# Optional preshared key for additional security
# PresharedKey = <base64-encoded-preshared-key>

# Keepalive interval in seconds (useful behind NAT)
PersistentKeepalive = 25
"#;

    println!("{}", example);
}

/// Bridge engine diagnostics into the process-wide tracing pipeline.
fn engine_log_sink() -> EngineLogger {
    EngineLogger::new(|level, message| match level {
        EngineLogLevel::Verbose => tracing::debug!(target: "wgtund::engine", "{}", message),
        EngineLogLevel::Info => tracing::info!(target: "wgtund::engine", "{}", message),
        EngineLogLevel::Error => tracing::error!(target: "wgtund::engine", "{}", message),
    })
}
