//! Client/server tests over a real Unix socket in a temp directory.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use wgtund::control::{read_frame, write_frame, ControlClient, ControlServer};
use wgtund::error::ControlError;
use wgtund::host::{StopReason, TunnelHost};
use wgtund::proto::{FaultCode, Request, Response, WireMessage};

/// Host stub that always reports the same fault, or nothing at all.
struct FixedHost {
    fault: FaultCode,
    mute: bool,
}

#[async_trait]
impl TunnelHost for FixedHost {
    async fn start(&self) -> Result<(), FaultCode> {
        Ok(())
    }

    async fn stop(&self, _reason: StopReason) {}

    async fn handle_message(&self, data: &[u8]) -> Option<Vec<u8>> {
        if self.mute {
            return None;
        }
        let Request::RetrieveLastError = Request::from_bytes(data)?;
        Some(Response::LastError(self.fault.clone()).to_bytes())
    }
}

fn spawn_server(
    path: &std::path::Path,
    fault: FaultCode,
    mute: bool,
) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let host: Arc<dyn TunnelHost> = Arc::new(FixedHost { fault, mute });
    let server = ControlServer::bind_at(path, host).unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(server.serve(shutdown.clone()));
    (shutdown, task)
}

#[tokio::test]
async fn test_client_retrieves_fault_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wg-test.sock");

    let fault = FaultCode::DnsResolutionFailed {
        hostnames: vec!["p2.example".to_string()],
    };
    let (shutdown, task) = spawn_server(&path, fault.clone(), false);

    let mut client = ControlClient::connect_path(&path).await.unwrap();
    assert_eq!(client.retrieve_last_error().await.unwrap(), fault);

    // The connection stays usable for further queries.
    assert_eq!(client.retrieve_last_error().await.unwrap(), fault);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_garbage_request_gets_empty_reply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wg-test.sock");

    let (shutdown, task) = spawn_server(&path, FaultCode::NoError, false);

    let mut stream = tokio::net::UnixStream::connect(&path).await.unwrap();
    write_frame(&mut stream, b"definitely not json").await.unwrap();
    let reply = read_frame(&mut stream).await.unwrap();
    assert_eq!(reply, Some(Vec::new()));

    // The connection survives the bad request.
    write_frame(&mut stream, &Request::RetrieveLastError.to_bytes())
        .await
        .unwrap();
    let reply = read_frame(&mut stream).await.unwrap().unwrap();
    assert_eq!(
        Response::from_bytes(&reply),
        Some(Response::LastError(FaultCode::NoError))
    );

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_mute_host_yields_no_response() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wg-test.sock");

    let (shutdown, task) = spawn_server(&path, FaultCode::NoError, true);

    let mut client = ControlClient::connect_path(&path).await.unwrap();
    assert!(matches!(
        client.retrieve_last_error().await,
        Err(ControlError::NoResponse)
    ));

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_second_bind_sees_live_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wg-test.sock");

    let (shutdown, task) = spawn_server(&path, FaultCode::NoError, false);

    let host: Arc<dyn TunnelHost> = Arc::new(FixedHost {
        fault: FaultCode::NoError,
        mute: false,
    });
    assert!(matches!(
        ControlServer::bind_at(&path, host),
        Err(ControlError::AlreadyRunning(_))
    ));

    shutdown.cancel();
    task.await.unwrap();
}
