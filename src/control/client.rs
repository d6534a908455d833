use std::path::Path;

use tokio::net::UnixStream;

use crate::control::socket::{read_frame, socket_path, write_frame};
use crate::error::ControlError;
use crate::proto::{FaultCode, Request, Response, WireMessage};

/// Client side of the control socket.
pub struct ControlClient {
    stream: UnixStream,
}

impl ControlClient {
    /// Connects to the conventional socket for `interface`.
    pub async fn connect(interface: &str) -> Result<Self, ControlError> {
        Self::connect_path(&socket_path(interface)).await
    }

    /// Connects to an explicit socket path.
    pub async fn connect_path(path: &Path) -> Result<Self, ControlError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream })
    }

    /// Asks the tunnel for the most recently recorded fault.
    ///
    /// An empty reply frame means the host declined to answer.
    pub async fn retrieve_last_error(&mut self) -> Result<FaultCode, ControlError> {
        let request = Request::RetrieveLastError.to_bytes();
        write_frame(&mut self.stream, &request).await?;

        let reply = read_frame(&mut self.stream)
            .await?
            .ok_or(ControlError::NoResponse)?;
        if reply.is_empty() {
            return Err(ControlError::NoResponse);
        }

        match Response::from_bytes(&reply) {
            Some(Response::LastError(fault)) => Ok(fault),
            None => Err(ControlError::MalformedResponse),
        }
    }
}
