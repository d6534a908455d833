//! wgtund - WireGuard tunnel daemon with a control socket
//!
//! This library drives the full lifecycle of a WireGuard tunnel: loading
//! and validating the saved configuration, resolving peer endpoints,
//! running the data plane on a boringtun-backed engine, and applying
//! addresses and routes over netlink. A Unix control socket exposes the
//! most recently recorded start failure to command line clients.
//!
//! # Example
//!
//! ```no_run
//! use wgtund::config::parse_config_file;
//!
//! let config = parse_config_file("wg0.conf").unwrap();
//! println!("Loaded {} peers", config.peers.len());
//! ```

pub mod cli;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod host;
pub mod platform;
pub mod proto;
pub mod resolver;

pub use error::{HostError, Result};
pub use host::{PacketTunnel, StopReason, TunnelHost};
pub use proto::FaultCode;
