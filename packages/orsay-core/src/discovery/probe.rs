//! Single-address probe.
//!
//! Verifies one user-supplied address with the vendor's standard ports. Used
//! when the user types an IP by hand; independent of any discovery run.

use tokio_util::sync::CancellationToken;

use super::profile::VendorProfile;
use super::scanner::scan_host;
use super::transport::ProbeTransport;
use super::types::DiscoveredDevice;
use crate::utils::validate_device_ip;

/// Probes `address` and returns a device if it scores at least the profile's
/// probe threshold. Invalid addresses are logged and yield `None`.
pub async fn probe_address(
    address: &str,
    profile: &VendorProfile,
    transport: &dyn ProbeTransport,
    cancel: &CancellationToken,
) -> Option<DiscoveredDevice> {
    let ip = match validate_device_ip(address) {
        Ok(ip) => ip,
        Err(e) => {
            log::warn!("[Probe] Rejected address: {}", e);
            return None;
        }
    };

    log::info!("[Probe] Probing {} on ports {:?}", ip, profile.standard_ports);

    let device = scan_host(
        ip,
        &profile.standard_ports,
        profile.probe_port_timeout,
        profile.probe_threshold,
        transport,
        profile,
        cancel,
    )
    .await;

    match &device {
        Some(device) => log::info!(
            "[Probe] {} looks like a TV ({}%)",
            device.display_text(),
            device.confidence
        ),
        None => log::info!("[Probe] No TV found at {}", ip),
    }

    device
}
