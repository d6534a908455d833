mod boring;
mod event_loop;
mod router;
mod session;
mod tun_io;
mod uapi;

use std::fmt;
use std::os::fd::RawFd;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineError;

pub use boring::BoringEngine;

/// Opaque identifier for a running engine instance.
///
/// Handles are positive and never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(i32);

impl EngineHandle {
    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity of an engine log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineLogLevel {
    Verbose,
    Info,
    Error,
}

/// Log sink the engine writes through.
///
/// The engine is a library component with no logging backend of its
/// own; whoever constructs it decides where the lines go.
#[derive(Clone)]
pub struct EngineLogger(Arc<dyn Fn(EngineLogLevel, &str) + Send + Sync>);

impl EngineLogger {
    pub fn new(sink: impl Fn(EngineLogLevel, &str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(sink))
    }

    /// A logger that swallows everything.
    pub fn disabled() -> Self {
        Self::new(|_, _| {})
    }

    pub fn verbose(&self, message: &str) {
        (self.0)(EngineLogLevel::Verbose, message)
    }

    pub fn info(&self, message: &str) {
        (self.0)(EngineLogLevel::Info, message)
    }

    pub fn error(&self, message: &str) {
        (self.0)(EngineLogLevel::Error, message)
    }
}

impl fmt::Debug for EngineLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EngineLogger")
    }
}

/// The tunnel data plane.
///
/// One engine can run several tunnel instances; each successful start
/// yields a handle the caller later passes to `stop`.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Starts a tunnel instance for `interface` from flat `key=value`
    /// settings text, moving packets through `descriptor`.
    ///
    /// The engine takes ownership of the descriptor, including on
    /// failure.
    async fn start(
        &self,
        interface: &str,
        settings: &str,
        descriptor: RawFd,
    ) -> Result<EngineHandle, EngineError>;

    /// Stops a running instance. Stopping an unknown handle is a no-op.
    async fn stop(&self, handle: EngineHandle);
}
