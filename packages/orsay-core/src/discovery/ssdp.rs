//! SSDP broadcast phase.
//!
//! Sends `M-SEARCH` to 239.255.255.250:1900 from the local address, collects
//! the unicast replies for the broadcast window, and resolves every vendor
//! response into a scored [`DiscoveredDevice`].
//!
//! The socket side sits behind [`SsdpSearcher`]; [`SsdpBroadcaster`] only sees
//! a stream of raw responses. The same socket sends and receives, since
//! devices reply unicast to the sending port.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::profile::VendorProfile;
use super::results::RunContext;
use super::scoring::{score, ScoreSignals};
use super::transport::ProbeTransport;
use super::types::{DiscoveredDevice, DiscoveryMethod};
use crate::error::DiscoveryError;
use crate::utils::{contains_ignore_ascii_case, starts_with_ignore_ascii_case};

/// Standard SSDP multicast group.
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Standard SSDP port.
pub const SSDP_PORT: u16 = 1900;

/// Receive buffer; SSDP responses fit in one datagram.
const RECV_BUFFER_SIZE: usize = 4096;

/// Responses buffered between the socket and the resolver.
const RESPONSE_CHANNEL_CAPACITY: usize = 64;

/// Configuration for the M-SEARCH burst.
#[derive(Debug, Clone)]
pub struct SsdpConfig {
    /// Number of M-SEARCH packets to send.
    pub send_count: u32,
    /// Delay between M-SEARCH sends.
    pub retry_delay: Duration,
    /// MX value (max response delay in seconds).
    pub mx_value: u32,
    /// Search target; `ssdp:all` so TVs answer for every service they host.
    pub search_target: String,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            send_count: 3,
            retry_delay: Duration::from_millis(100),
            mx_value: 3,
            search_target: "ssdp:all".to_string(),
        }
    }
}

/// Build the M-SEARCH message.
pub fn build_msearch_message(config: &SsdpConfig) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\r\n",
        SSDP_MULTICAST_ADDR, SSDP_PORT, config.mx_value, config.search_target
    )
}

/// Returns true if the raw response carries any of the vendor's signature tokens.
///
/// ASCII case-insensitive; no allocation.
pub fn is_vendor_response(profile: &VendorProfile, response: &str) -> bool {
    profile
        .classifier_tokens
        .iter()
        .any(|token| contains_ignore_ascii_case(response, token))
}

/// Extracts a header value from a raw SSDP response (case-insensitive name).
///
/// Splits at the first colon so URL colons in the value are preserved.
pub fn extract_header(response: &str, name: &str) -> Option<String> {
    response
        .lines()
        .find(|line| {
            starts_with_ignore_ascii_case(line, name)
                && line.as_bytes().get(name.len()) == Some(&b':')
        })
        .and_then(|line| line.find(':').map(|idx| line[idx + 1..].trim()))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// One raw datagram received during the broadcast window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpResponse {
    pub source: IpAddr,
    pub payload: String,
}

/// Sends the search and forwards raw responses until the window closes.
#[async_trait]
pub trait SsdpSearcher: Send + Sync {
    /// Returns once `window` has elapsed after the last send, `cancel` fires,
    /// or the receiver is dropped. Errors mean nothing could be sent.
    async fn search(
        &self,
        local_ip: Ipv4Addr,
        window: Duration,
        cancel: &CancellationToken,
        responses: mpsc::Sender<SsdpResponse>,
    ) -> Result<(), DiscoveryError>;
}

/// Real searcher over a UDP socket joined to the SSDP multicast group.
#[derive(Debug, Clone, Default)]
pub struct MulticastSearcher {
    config: SsdpConfig,
}

impl MulticastSearcher {
    pub fn new(config: SsdpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SsdpSearcher for MulticastSearcher {
    async fn search(
        &self,
        local_ip: Ipv4Addr,
        window: Duration,
        cancel: &CancellationToken,
        responses: mpsc::Sender<SsdpResponse>,
    ) -> Result<(), DiscoveryError> {
        let socket = create_socket(local_ip)?;
        let msg = build_msearch_message(&self.config);
        let target = SocketAddr::from((SSDP_MULTICAST_ADDR, SSDP_PORT));

        log::debug!(
            "[SSDP] Searching from {} ({} sends with {}ms spacing, window {}ms)",
            local_ip,
            self.config.send_count,
            self.config.retry_delay.as_millis(),
            window.as_millis()
        );

        let mut last_error = None;
        let mut sent = 0u32;
        for i in 0..self.config.send_count {
            if i > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    _ = sleep(self.config.retry_delay) => {}
                }
            }
            match socket.send_to(msg.as_bytes(), target).await {
                Ok(_) => {
                    sent += 1;
                    log::trace!("[SSDP] Sent M-SEARCH from {} to {}", local_ip, target);
                }
                Err(e) => {
                    log::warn!(
                        "[SSDP] Failed to send M-SEARCH from {} (attempt {}): {}",
                        local_ip,
                        i + 1,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        if sent == 0 {
            if let Some(e) = last_error {
                return Err(DiscoveryError::SendSearch(e));
            }
        }

        let deadline = Instant::now() + window;
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("[SSDP] Search cancelled");
                    break;
                }
                _ = sleep_until(deadline) => break,
                result = socket.recv_from(&mut buf) => match result {
                    Ok((len, src)) => {
                        let response = SsdpResponse {
                            source: src.ip(),
                            payload: String::from_utf8_lossy(&buf[..len]).into_owned(),
                        };
                        if !forward_response(&responses, response, deadline, cancel).await {
                            break;
                        }
                    }
                    // Windows reports ICMP port-unreachable as a recv error.
                    Err(e) => log::debug!("[SSDP] Recv error on {}: {}", local_ip, e),
                },
            }
        }

        Ok(())
    }
}

/// Hands one response to the resolver, waiting for channel space at most
/// until `deadline` or cancellation.
///
/// Returns false when the receive loop should stop.
async fn forward_response(
    responses: &mpsc::Sender<SsdpResponse>,
    response: SsdpResponse,
    deadline: Instant,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = responses.send(response) => sent.is_ok(),
        _ = sleep_until(deadline) => {
            log::debug!("[SSDP] Window closed while the resolver was busy");
            false
        }
    }
}

/// Creates a UDP socket bound to the local address and joined to the SSDP group.
///
/// - SO_REUSEADDR for rapid restarts
/// - SO_REUSEPORT on Unix
/// - Multicast TTL of 4 per UPnP spec
fn create_socket(local_ip: Ipv4Addr) -> Result<UdpSocket, DiscoveryError> {
    let bind_addr = SocketAddr::new(IpAddr::V4(local_ip), 0);

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(DiscoveryError::SocketBind)?;

    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("[SSDP] Failed to set SO_REUSEADDR on {}: {}", local_ip, e);
    }

    #[cfg(unix)]
    if let Err(e) = socket.set_reuse_port(true) {
        log::warn!("[SSDP] Failed to set SO_REUSEPORT on {}: {}", local_ip, e);
    }

    if let Err(e) = socket.set_multicast_ttl_v4(4) {
        log::warn!("[SSDP] Failed to set multicast TTL on {}: {}", local_ip, e);
    }

    if let Err(e) = socket.set_multicast_if_v4(&local_ip) {
        log::warn!("[SSDP] Failed to set multicast interface {}: {}", local_ip, e);
    }

    socket
        .set_nonblocking(true)
        .map_err(DiscoveryError::SocketBind)?;
    socket
        .bind(&bind_addr.into())
        .map_err(DiscoveryError::SocketBind)?;

    let std_socket: std::net::UdpSocket = socket.into();
    let socket = UdpSocket::from_std(std_socket).map_err(DiscoveryError::SocketBind)?;
    socket
        .join_multicast_v4(SSDP_MULTICAST_ADDR, local_ip)
        .map_err(DiscoveryError::MulticastJoin)?;

    Ok(socket)
}

/// Runs the broadcast phase and resolves vendor responses.
pub struct SsdpBroadcaster {
    searcher: Arc<dyn SsdpSearcher>,
    transport: Arc<dyn ProbeTransport>,
    profile: Arc<VendorProfile>,
}

impl SsdpBroadcaster {
    pub fn new(
        searcher: Arc<dyn SsdpSearcher>,
        transport: Arc<dyn ProbeTransport>,
        profile: Arc<VendorProfile>,
    ) -> Self {
        Self {
            searcher,
            transport,
            profile,
        }
    }

    /// Runs one broadcast window. Each resolved device is recorded in `ctx`
    /// as soon as it is scored. Socket failures are logged and absorbed.
    ///
    /// Returns the number of devices this phase resolved.
    pub(crate) async fn run(
        &self,
        local_ip: Ipv4Addr,
        window: Duration,
        cancel: &CancellationToken,
        ctx: &RunContext,
    ) -> usize {
        let (tx, mut rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);

        let search = async {
            if let Err(e) = self.searcher.search(local_ip, window, cancel, tx).await {
                log::warn!("[SSDP] Broadcast phase skipped: {}", e);
            }
        };

        let resolve = async {
            let mut accepted: HashSet<IpAddr> = HashSet::new();
            let mut rejected: HashSet<IpAddr> = HashSet::new();
            let mut resolved = 0usize;

            while let Some(response) = rx.recv().await {
                if cancel.is_cancelled() {
                    // Drain without resolving so the searcher is not blocked.
                    continue;
                }
                if accepted.contains(&response.source) {
                    continue;
                }
                if !is_vendor_response(&self.profile, &response.payload) {
                    if rejected.insert(response.source) {
                        log::trace!("[SSDP] Ignoring non-vendor response from {}", response.source);
                    }
                    continue;
                }

                accepted.insert(response.source);
                log::debug!("[SSDP] Vendor response from {}", response.source);

                let device = self.resolve(&response, cancel).await;
                if cancel.is_cancelled() {
                    // The description fetch was cut short; the score is incomplete.
                    log::debug!("[SSDP] Dropping {} resolved during cancellation", device.address);
                    continue;
                }
                ctx.record(device);
                resolved += 1;
            }

            resolved
        };

        let ((), resolved) = tokio::join!(search, resolve);
        resolved
    }

    async fn resolve(&self, response: &SsdpResponse, cancel: &CancellationToken) -> DiscoveredDevice {
        let address = response.source.to_string();
        let location = extract_header(&response.payload, "LOCATION");
        let usn = extract_header(&response.payload, "USN");

        let description = self
            .transport
            .fetch_description(&address, location.as_deref(), cancel)
            .await;

        let confidence = score(
            &self.profile,
            &ScoreSignals {
                ssdp_response: Some(&response.payload),
                description: description.as_ref(),
                open_ports: &[],
            },
        );

        DiscoveredDevice::new(address, DiscoveryMethod::Broadcast, confidence, description, [])
            .with_usn(usn)
    }
}
