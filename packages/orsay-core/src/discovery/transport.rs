//! Network access used by the port scan and the probe.
//!
//! [`ProbeTransport`] is the seam between the discovery logic and the wire:
//! the scanner and the probe only ever ask "is this port open?" and "what
//! does this host describe itself as?".

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::description::{DescriptionFetcher, DESCRIPTION_FETCH_TIMEOUT};
use super::profile::VendorProfile;
use super::types::DeviceDescription;

/// TCP reachability and description retrieval for one host.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Bare TCP connect with no payload. Any failure, timeout or
    /// cancellation counts as closed.
    async fn is_port_open(
        &self,
        ip: Ipv4Addr,
        port: u16,
        connect_timeout: Duration,
        cancel: &CancellationToken,
    ) -> bool;

    /// Fetches the host's description, trying `location` first.
    async fn fetch_description(
        &self,
        address: &str,
        location: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<DeviceDescription>;
}

/// Real transport: tokio TCP connects plus HTTP description fetches.
#[derive(Debug, Clone)]
pub struct NetworkTransport {
    fetcher: DescriptionFetcher,
}

impl NetworkTransport {
    pub fn new(profile: &VendorProfile) -> Self {
        Self {
            fetcher: DescriptionFetcher::new(
                profile.description_endpoints.clone(),
                DESCRIPTION_FETCH_TIMEOUT,
            ),
        }
    }
}

#[async_trait]
impl ProbeTransport for NetworkTransport {
    async fn is_port_open(
        &self,
        ip: Ipv4Addr,
        port: u16,
        connect_timeout: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let addr = SocketAddr::from((ip, port));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            result = timeout(connect_timeout, TcpStream::connect(addr)) => match result {
                Ok(Ok(_stream)) => true,
                Ok(Err(e)) => {
                    log::trace!("[PortScan] {} closed: {}", addr, e);
                    false
                }
                Err(_) => false,
            },
        }
    }

    async fn fetch_description(
        &self,
        address: &str,
        location: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<DeviceDescription> {
        self.fetcher.fetch(address, location, cancel).await
    }
}
