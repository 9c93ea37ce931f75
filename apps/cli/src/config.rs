//! CLI configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use orsay_core::DiscoveryOptions;
use serde::Deserialize;

/// Discovery configuration loaded from YAML with environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Local address to discover from. Auto-detected when unset.
    /// Override: `ORSAY_LOCAL_IP`
    pub local_ip: Option<Ipv4Addr>,

    /// How long to collect SSDP responses, in milliseconds.
    /// Override: `ORSAY_BROADCAST_TIMEOUT_MS`
    pub broadcast_timeout_ms: u64,

    /// TCP connect timeout per port, in milliseconds.
    /// Override: `ORSAY_PORT_TIMEOUT_MS`
    pub port_timeout_ms: u64,

    /// Hosts probed at once during the port scan.
    /// Override: `ORSAY_MAX_CONCURRENT_PROBES`
    pub max_concurrent_probes: usize,

    /// Subnet prefix length scanned around the local address.
    /// Override: `ORSAY_SUBNET_MASK`
    pub subnet_mask: u8,

    /// Run the subnet port scan after SSDP.
    /// Override: `ORSAY_PORT_SCAN`
    pub port_scan: bool,

    /// Ports probed on every host.
    pub probe_ports: Vec<u16>,
}

impl Default for CliConfig {
    fn default() -> Self {
        let options = DiscoveryOptions::default();
        Self {
            local_ip: None,
            broadcast_timeout_ms: options.broadcast_timeout.as_millis() as u64,
            port_timeout_ms: options.port_probe_timeout.as_millis() as u64,
            max_concurrent_probes: options.max_concurrent_probes,
            subnet_mask: options.subnet_mask,
            port_scan: options.enable_port_scan,
            probe_ports: options.probe_ports,
        }
    }
}

impl CliConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Unparseable values are logged and ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let val = lookup(key)?;
            match val.trim().parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    log::warn!("Ignoring {}={:?}: not a valid value", key, val);
                    None
                }
            }
        }

        if let Some(ip) = parsed(&lookup, "ORSAY_LOCAL_IP") {
            self.local_ip = Some(ip);
        }
        if let Some(ms) = parsed(&lookup, "ORSAY_BROADCAST_TIMEOUT_MS") {
            self.broadcast_timeout_ms = ms;
        }
        if let Some(ms) = parsed(&lookup, "ORSAY_PORT_TIMEOUT_MS") {
            self.port_timeout_ms = ms;
        }
        if let Some(n) = parsed(&lookup, "ORSAY_MAX_CONCURRENT_PROBES") {
            self.max_concurrent_probes = n;
        }
        if let Some(mask) = parsed(&lookup, "ORSAY_SUBNET_MASK") {
            self.subnet_mask = mask;
        }
        if let Some(enabled) = parsed(&lookup, "ORSAY_PORT_SCAN") {
            self.port_scan = enabled;
        }
    }

    /// Converts to orsay-core's per-run options.
    pub fn to_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            broadcast_timeout: Duration::from_millis(self.broadcast_timeout_ms),
            port_probe_timeout: Duration::from_millis(self.port_timeout_ms),
            max_concurrent_probes: self.max_concurrent_probes,
            enable_port_scan: self.port_scan,
            probe_ports: self.probe_ports.clone(),
            subnet_mask: self.subnet_mask,
        }
    }
}
