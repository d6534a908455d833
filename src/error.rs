use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::proto::FaultCode;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Control channel error: {0}")]
    Control(#[from] ControlError),

    #[error("Protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("Tunnel start failed: {0}")]
    Start(#[from] FaultCode),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("File error: {0}")]
    File(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Failed to create TUN device: {0}")]
    TunCreation(String),

    #[error("Failed to add address: {0}")]
    AddAddress(String),

    #[error("Failed to add route: {0}")]
    AddRoute(String),

    #[error("Failed to set interface up: {0}")]
    SetLinkUp(String),

    #[error("Netlink error: {0}")]
    Netlink(String),

    #[error("Socket error: {0}")]
    Socket(#[from] io::Error),
}

/// Reasons the engine refuses a start request.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unusable data channel descriptor: {0}")]
    Descriptor(#[source] io::Error),

    #[error("Invalid engine settings: {0}")]
    InvalidSettings(String),

    #[error("Noise initialization failed: {0}")]
    Noise(String),

    #[error("Failed to bind engine socket: {0}")]
    Bind(#[source] io::Error),
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Control socket already in use: {}", .0.display())]
    AlreadyRunning(PathBuf),

    #[error("Path exists but is not a socket: {}", .0.display())]
    NotASocket(PathBuf),

    #[error("Control frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Daemon returned no response")]
    NoResponse,

    #[error("Malformed response from daemon")]
    MalformedResponse,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoError {
    #[error("Malformed control message")]
    MalformedMessage,
}

pub type Result<T> = std::result::Result<T, HostError>;
