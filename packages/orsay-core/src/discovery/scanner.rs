//! Subnet port-scan phase.
//!
//! One unit of work per host, admitted through a semaphore so at most
//! `max_concurrent_probes` hosts are probed at once. Inside a unit the vendor
//! ports are tried one after another; a host with any open port gets a
//! description fetch and a score. Accepted hosts are recorded the moment
//! their unit finishes, not at the end of the phase.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::profile::VendorProfile;
use super::results::RunContext;
use super::scoring::{score, ScoreSignals};
use super::subnet::Subnet;
use super::transport::ProbeTransport;
use super::types::{DiscoveredDevice, DiscoveryMethod, DiscoveryOptions, DiscoveryPhase};
use crate::error::{DiscoveryError, DiscoveryResult};

/// First percent of the port-scan phase.
pub const PORT_SCAN_START_PERCENT: u8 = 50;

/// Percent range covered by the port-scan phase (50 to 95).
pub const PORT_SCAN_SPAN_PERCENT: usize = 45;

/// Probes one host's ports in order and scores what it finds.
///
/// Returns a [`DiscoveryMethod::PortScan`] device if any port is open and the
/// score reaches `threshold`.
pub(crate) async fn scan_host(
    ip: Ipv4Addr,
    ports: &[u16],
    connect_timeout: Duration,
    threshold: u8,
    transport: &dyn ProbeTransport,
    profile: &VendorProfile,
    cancel: &CancellationToken,
) -> Option<DiscoveredDevice> {
    let mut open_ports = Vec::new();
    for &port in ports {
        if transport.is_port_open(ip, port, connect_timeout, cancel).await {
            log::debug!("[PortScan] {}:{} open", ip, port);
            open_ports.push(port);
        }
    }

    if open_ports.is_empty() {
        return None;
    }

    let address = ip.to_string();
    let description = transport.fetch_description(&address, None, cancel).await;
    let confidence = score(
        profile,
        &ScoreSignals {
            ssdp_response: None,
            description: description.as_ref(),
            open_ports: &open_ports,
        },
    );

    if confidence < threshold {
        log::debug!(
            "[PortScan] {} below threshold ({}% < {}%, ports {:?})",
            ip,
            confidence,
            threshold,
            open_ports
        );
        return None;
    }

    Some(DiscoveredDevice::new(
        address,
        DiscoveryMethod::PortScan,
        confidence,
        description,
        open_ports,
    ))
}

/// Scans every remaining host of a subnet for the vendor ports.
pub struct SubnetPortScanner {
    transport: Arc<dyn ProbeTransport>,
    profile: Arc<VendorProfile>,
}

impl SubnetPortScanner {
    pub fn new(transport: Arc<dyn ProbeTransport>, profile: Arc<VendorProfile>) -> Self {
        Self { transport, profile }
    }

    /// Runs the scan over `subnet`, skipping `exclude`.
    ///
    /// Cancellation stops admission of new hosts; units already running
    /// finish within their own timeouts and their finds are kept.
    ///
    /// Returns the number of hosts accepted, or [`DiscoveryError::WorkerFailed`]
    /// if a unit panicked.
    pub(crate) async fn run(
        &self,
        subnet: &Subnet,
        exclude: &HashSet<Ipv4Addr>,
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
        ctx: &Arc<RunContext>,
    ) -> DiscoveryResult<usize> {
        let hosts: Vec<Ipv4Addr> = subnet
            .hosts()
            .filter(|ip| !exclude.contains(ip))
            .collect();
        let total = hosts.len();

        log::info!(
            "[PortScan] Scanning {} hosts in {}/{} ({} at a time, ports {:?})",
            total,
            subnet.network(),
            subnet.prefix_len(),
            options.max_concurrent_probes,
            options.probe_ports
        );

        if total == 0 {
            return Ok(0);
        }

        let semaphore = Arc::new(Semaphore::new(options.max_concurrent_probes.max(1)));
        let completed = Arc::new(AtomicUsize::new(0));
        let ports: Arc<[u16]> = options.probe_ports.clone().into();
        let connect_timeout = options.port_probe_timeout;
        let threshold = self.profile.port_scan_threshold;
        let mut workers = JoinSet::new();

        for ip in hosts {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let transport = Arc::clone(&self.transport);
            let profile = Arc::clone(&self.profile);
            let ctx = Arc::clone(ctx);
            let cancel = cancel.clone();
            let ports = Arc::clone(&ports);
            let completed = Arc::clone(&completed);

            workers.spawn(async move {
                let _permit = permit;
                let found = scan_host(
                    ip,
                    &ports,
                    connect_timeout,
                    threshold,
                    transport.as_ref(),
                    &profile,
                    &cancel,
                )
                .await;

                let accepted = found.is_some();
                if let Some(device) = found {
                    ctx.record(device);
                }

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                let percent =
                    PORT_SCAN_START_PERCENT + (PORT_SCAN_SPAN_PERCENT * done / total) as u8;
                ctx.report(
                    DiscoveryPhase::PortProbing,
                    percent,
                    format!("Scanning {}... ({}/{})", ip, done, total),
                    Some(ip.to_string()),
                );

                accepted
            });
        }

        let mut accepted = 0usize;
        let mut failure = None;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(true) => accepted += 1,
                Ok(false) => {}
                Err(e) if e.is_panic() => {
                    log::error!("[PortScan] Worker panicked: {}", e);
                    failure = Some(e.to_string());
                }
                Err(e) => log::debug!("[PortScan] Worker cancelled: {}", e),
            }
        }

        if let Some(message) = failure {
            return Err(DiscoveryError::WorkerFailed(message));
        }

        log::info!(
            "[PortScan] Finished: {} accepted, {}/{} hosts scanned",
            accepted,
            completed.load(Ordering::SeqCst),
            total
        );
        Ok(accepted)
    }
}
