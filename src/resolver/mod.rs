mod system;

use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Endpoint;

pub use system::SystemResolver;

/// All named endpoints that could not be resolved, in peer order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("DNS resolution failed for: {}", hostnames.join(", "))]
pub struct DnsFailure {
    pub hostnames: Vec<String>,
}

/// Resolves peer endpoints to socket addresses.
///
/// The result is positional: slot `i` of the output corresponds to slot
/// `i` of the input, and a `None` input slot stays `None`. Resolution is
/// all-or-nothing; a single unresolvable hostname fails the whole call
/// and the error carries every hostname that failed.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn resolve(
        &self,
        endpoints: &[Option<Endpoint>],
    ) -> Result<Vec<Option<SocketAddr>>, DnsFailure>;
}
