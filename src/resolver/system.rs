use std::net::SocketAddr;

use async_trait::async_trait;
use futures::future::join_all;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

use crate::config::{Endpoint, Host};

use super::{DnsFailure, EndpointResolver};

/// Resolver backed by the system DNS configuration.
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            debug!("system resolver config unavailable ({}), using defaults", e);
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { resolver }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EndpointResolver for SystemResolver {
    async fn resolve(
        &self,
        endpoints: &[Option<Endpoint>],
    ) -> Result<Vec<Option<SocketAddr>>, DnsFailure> {
        // One lookup per named endpoint, run concurrently. IP literals
        // and empty slots never touch the resolver.
        let lookups = endpoints.iter().map(|slot| async move {
            let endpoint = match slot {
                Some(endpoint) => endpoint,
                None => return Ok(None),
            };
            match &endpoint.host {
                Host::Ip(ip) => Ok(Some(SocketAddr::new(*ip, endpoint.port))),
                Host::Name(name) => match self.resolver.lookup_ip(name.as_str()).await {
                    Ok(lookup) => match lookup.into_iter().next() {
                        Some(ip) => Ok(Some(SocketAddr::new(ip, endpoint.port))),
                        None => Err(name.clone()),
                    },
                    Err(e) => {
                        debug!("lookup for {} failed: {}", name, e);
                        Err(name.clone())
                    }
                },
            }
        });

        let mut resolved = Vec::with_capacity(endpoints.len());
        let mut failed = Vec::new();
        for outcome in join_all(lookups).await {
            match outcome {
                Ok(slot) => resolved.push(slot),
                Err(hostname) => {
                    failed.push(hostname);
                    resolved.push(None);
                }
            }
        }

        if failed.is_empty() {
            Ok(resolved)
        } else {
            Err(DnsFailure { hostnames: failed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ip_literals_bypass_dns() {
        let resolver = SystemResolver::new();
        let endpoints = vec![
            None,
            Some("203.0.113.4:51820".parse::<Endpoint>().unwrap()),
            Some("[fd00::1]:51820".parse::<Endpoint>().unwrap()),
        ];
        let resolved = resolver.resolve(&endpoints).await.unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0], None);
        assert_eq!(resolved[1], Some("203.0.113.4:51820".parse().unwrap()));
        assert_eq!(resolved[2], Some("[fd00::1]:51820".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let resolver = SystemResolver::new();
        let resolved = resolver.resolve(&[]).await.unwrap();
        assert!(resolved.is_empty());
    }
}
