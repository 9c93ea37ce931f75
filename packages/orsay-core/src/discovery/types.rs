//! Shared types for TV discovery.
//!
//! This module contains types used by both discovery phases (SSDP and port
//! scan), the coordinator that merges their results, and the event stream.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;

use crate::utils::now_millis;

/// Which discovery phase(s) confirmed a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveryMethod {
    /// SSDP M-SEARCH response on 239.255.255.250:1900.
    Broadcast,
    /// TCP connect scan of the vendor ports.
    PortScan,
    /// Confirmed by both phases.
    Both,
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broadcast => write!(f, "SSDP"),
            Self::PortScan => write!(f, "port scan"),
            Self::Both => write!(f, "SSDP + port scan"),
        }
    }
}

/// Phase of a discovery run, as reported in progress events.
///
/// `SsdpBroadcast` and `SsdpListening` together make up the broadcast phase;
/// `PortProbing` is the optional subnet scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveryPhase {
    /// No run active.
    #[default]
    Idle,
    /// Run accepted, nothing on the wire yet.
    Starting,
    /// Sending M-SEARCH and collecting responses.
    SsdpBroadcast,
    /// Broadcast window closed, results merged.
    SsdpListening,
    /// Scanning subnet hosts.
    PortProbing,
    /// Run finished normally.
    Completed,
    /// Run stopped by the caller; partial results are still returned.
    Cancelled,
    /// Run aborted by an unexpected fault.
    Failed,
}

impl DiscoveryPhase {
    /// Returns true for phases that end a run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::SsdpBroadcast => "ssdp broadcast",
            Self::SsdpListening => "ssdp listening",
            Self::PortProbing => "port probing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Identity fields parsed from a UPnP device description document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescription {
    pub friendly_name: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
}

impl DeviceDescription {
    /// Returns true if no identity field was found.
    pub fn is_empty(&self) -> bool {
        self.friendly_name.is_none()
            && self.model_name.is_none()
            && self.model_number.is_none()
            && self.serial_number.is_none()
            && self.manufacturer.is_none()
    }
}

/// A TV candidate accepted by at least one discovery phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    /// IPv4 address; unique within one discovery run.
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    /// Model name, e.g. "UE40F6400".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// SSDP `USN` header, when found by broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_service_name: Option<String>,
    pub method: DiscoveryMethod,
    /// Confidence (0-100) that this is an Orsay TV.
    pub confidence: u8,
    pub open_ports: BTreeSet<u16>,
    /// Unix timestamp in milliseconds.
    pub discovered_at: u64,
}

impl DiscoveredDevice {
    /// Creates a device from a phase's findings. `confidence` is clamped to 100.
    pub fn new(
        address: impl Into<String>,
        method: DiscoveryMethod,
        confidence: u8,
        description: Option<DeviceDescription>,
        open_ports: impl IntoIterator<Item = u16>,
    ) -> Self {
        let description = description.unwrap_or_default();
        Self {
            address: address.into(),
            friendly_name: description.friendly_name,
            model_name: description.model_name,
            model_number: description.model_number,
            serial_number: description.serial_number,
            manufacturer: description.manufacturer,
            unique_service_name: None,
            method,
            confidence: confidence.min(100),
            open_ports: open_ports.into_iter().collect(),
            discovered_at: now_millis(),
        }
    }

    /// Attaches the SSDP unique service name.
    #[must_use]
    pub fn with_usn(mut self, usn: Option<String>) -> Self {
        self.unique_service_name = usn;
        self
    }

    /// Folds a confirmation from the other phase into this device.
    ///
    /// - method becomes [`DiscoveryMethod::Both`]
    /// - confidence becomes `min(100, confidence + bonus)`
    /// - open ports are unioned
    ///
    /// Identity fields of the first find are kept.
    pub fn merge(&mut self, other: &DiscoveredDevice, bonus: u8) {
        self.method = DiscoveryMethod::Both;
        self.confidence = self.confidence.saturating_add(bonus).min(100);
        self.open_ports.extend(other.open_ports.iter().copied());
    }

    /// Display text for UI lists: `"Name (ip)"`, or just the address.
    pub fn display_text(&self) -> String {
        match self.friendly_name.as_deref() {
            Some(name) if !name.is_empty() => format!("{} ({})", name, self.address),
            _ => self.address.clone(),
        }
    }

    /// Model number if known, otherwise model name.
    pub fn version_info(&self) -> Option<&str> {
        self.model_number
            .as_deref()
            .or(self.model_name.as_deref())
    }
}

impl std::fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_text())
    }
}

/// Per-run discovery settings. Immutable for the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// How long to collect SSDP responses.
    pub broadcast_timeout: Duration,
    /// Timeout for one TCP connect attempt.
    pub port_probe_timeout: Duration,
    /// Upper bound on hosts probed at once.
    pub max_concurrent_probes: usize,
    /// Run the subnet port scan after the broadcast phase.
    pub enable_port_scan: bool,
    /// Ports probed on every host, in order.
    pub probe_ports: Vec<u16>,
    /// Subnet prefix length used to enumerate hosts.
    pub subnet_mask: u8,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            broadcast_timeout: Duration::from_secs(5),
            port_probe_timeout: Duration::from_secs(1),
            max_concurrent_probes: 20,
            enable_port_scan: true,
            probe_ports: vec![7676, 8443, 55000],
            subnet_mask: 24,
        }
    }
}

impl DiscoveryOptions {
    /// Checks the options for values no run can work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.subnet_mask > 32 {
            return Err(format!(
                "subnet mask /{} is wider than 32 bits",
                self.subnet_mask
            ));
        }
        if self.max_concurrent_probes == 0 {
            return Err("max concurrent probes must be at least 1".to_string());
        }
        if self.enable_port_scan && self.probe_ports.is_empty() {
            return Err("port scan enabled without any probe ports".to_string());
        }
        Ok(())
    }
}

/// Progress snapshot emitted on every phase or percent change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryProgress {
    pub phase: DiscoveryPhase,
    /// 0-100, never decreasing within a run.
    pub percent: u8,
    pub message: String,
    pub devices_found: usize,
    /// Host being probed, during the port scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_address: Option<String>,
}

/// Final result of a run that was not rejected or aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryOutcome {
    /// [`DiscoveryPhase::Completed`] or [`DiscoveryPhase::Cancelled`].
    pub phase: DiscoveryPhase,
    /// Sorted by descending confidence, then ascending address.
    pub devices: Vec<DiscoveredDevice>,
}

impl DiscoveryOutcome {
    pub fn was_cancelled(&self) -> bool {
        self.phase == DiscoveryPhase::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcast_find() -> DiscoveredDevice {
        DiscoveredDevice::new(
            "192.168.1.20",
            DiscoveryMethod::Broadcast,
            65,
            Some(DeviceDescription {
                friendly_name: Some("[TV] Living Room".to_string()),
                model_name: Some("UE40F6400".to_string()),
                ..Default::default()
            }),
            [7676],
        )
    }

    #[test]
    fn merge_marks_both_and_adds_bonus() {
        let mut device = broadcast_find();
        let scan = DiscoveredDevice::new(
            "192.168.1.20",
            DiscoveryMethod::PortScan,
            90,
            None,
            [55000, 7676],
        );

        device.merge(&scan, 20);

        assert_eq!(device.method, DiscoveryMethod::Both);
        assert_eq!(device.confidence, 85);
        assert_eq!(device.open_ports, BTreeSet::from([7676, 55000]));
        assert_eq!(device.friendly_name.as_deref(), Some("[TV] Living Room"));
    }

    #[test]
    fn merge_caps_confidence_at_100() {
        let mut device = broadcast_find();
        device.confidence = 95;
        let scan = DiscoveredDevice::new("192.168.1.20", DiscoveryMethod::PortScan, 50, None, []);

        device.merge(&scan, 20);

        assert_eq!(device.confidence, 100);
    }

    #[test]
    fn new_clamps_confidence() {
        let device = DiscoveredDevice::new("10.0.0.2", DiscoveryMethod::PortScan, 250, None, []);
        assert_eq!(device.confidence, 100);
    }

    #[test]
    fn display_text_falls_back_to_address() {
        let named = broadcast_find();
        assert_eq!(named.display_text(), "[TV] Living Room (192.168.1.20)");

        let unnamed = DiscoveredDevice::new("10.0.0.2", DiscoveryMethod::PortScan, 40, None, []);
        assert_eq!(unnamed.display_text(), "10.0.0.2");
    }

    #[test]
    fn version_info_prefers_model_number() {
        let mut device = broadcast_find();
        assert_eq!(device.version_info(), Some("UE40F6400"));
        device.model_number = Some("AllShare1.0".to_string());
        assert_eq!(device.version_info(), Some("AllShare1.0"));
    }

    #[test]
    fn default_options_are_valid() {
        let options = DiscoveryOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.max_concurrent_probes, 20);
        assert_eq!(options.probe_ports, vec![7676, 8443, 55000]);
    }

    #[test]
    fn validate_rejects_bad_options() {
        let mask = DiscoveryOptions {
            subnet_mask: 33,
            ..Default::default()
        };
        assert!(mask.validate().is_err());

        let concurrency = DiscoveryOptions {
            max_concurrent_probes: 0,
            ..Default::default()
        };
        assert!(concurrency.validate().is_err());

        let ports = DiscoveryOptions {
            probe_ports: vec![],
            ..Default::default()
        };
        assert!(ports.validate().is_err());

        let broadcast_only = DiscoveryOptions {
            probe_ports: vec![],
            enable_port_scan: false,
            ..Default::default()
        };
        assert!(broadcast_only.validate().is_ok());
    }

    #[test]
    fn device_serializes_camel_case() {
        let json = serde_json::to_value(broadcast_find()).unwrap();
        assert_eq!(json["address"], "192.168.1.20");
        assert_eq!(json["friendlyName"], "[TV] Living Room");
        assert_eq!(json["method"], "broadcast");
        assert_eq!(json["openPorts"], serde_json::json!([7676]));
        assert!(json.get("serialNumber").is_none());
    }
}
