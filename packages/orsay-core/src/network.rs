//! Local network interface selection.
//!
//! Discovery has to start from the address of the interface that shares a
//! LAN with the TV. Machines running an installer usually have several:
//! Ethernet and Wi-Fi next to Hyper-V switches, Docker bridges and VPN
//! tunnels. Interfaces are ranked so the physical adapter comes first.
//!
//! | Kind | Base score |
//! |---|---|
//! | Ethernet | 100 |
//! | Wi-Fi | 80 |
//! | Other | 40 |
//! | Virtual | 20 |
//! | VPN | 10 |
//!
//! Adjustments: virtual −60, CGNAT `100.64.0.0/10` −30, link-local
//! `169.254.0.0/16` −80. Scores never drop below 1.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use serde::Serialize;

use crate::utils::{contains_ignore_ascii_case, starts_with_ignore_ascii_case};

/// Name fragments of virtual, container and tunnel adapters.
pub const VIRTUAL_ADAPTER_PATTERNS: &[&str] = &[
    "vethernet",
    "hyper-v",
    "vmware",
    "vmnet",
    "virtualbox",
    "vboxnet",
    "host-only",
    "docker",
    "br-",
    "virbr",
    "veth",
    "container",
    "wsl",
    "loopback",
    "pseudo",
    "wi-fi direct",
    "p2p",
    "bluetooth",
    "parallels",
    "teredo",
    "isatap",
    "6to4",
];

/// Name fragments of VPN adapters.
pub const VPN_ADAPTER_PATTERNS: &[&str] = &[
    "vpn",
    "tun",
    "tap",
    "utun",
    "ppp",
    "ipsec",
    "wg",
    "wireguard",
    "tailscale",
    "zerotier",
    "hamachi",
    "anyconnect",
    "globalprotect",
    "fortinet",
    "mullvad",
    "nordlynx",
];

const ETHERNET_PREFIXES: &[&str] = &["eth", "en", "em", "ethernet"];
const WIFI_PREFIXES: &[&str] = &["wlan", "wl", "wi-fi", "wifi", "wireless", "ath"];

/// Adapter category derived from the interface name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AdapterKind {
    Ethernet,
    WiFi,
    Other,
    Virtual,
    Vpn,
}

impl AdapterKind {
    fn base_score(self) -> i32 {
        match self {
            Self::Ethernet => 100,
            Self::WiFi => 80,
            Self::Other => 40,
            Self::Virtual => 20,
            Self::Vpn => 10,
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ethernet => "Ethernet",
            Self::WiFi => "Wi-Fi",
            Self::Other => "Other",
            Self::Virtual => "Virtual",
            Self::Vpn => "VPN",
        };
        f.write_str(s)
    }
}

/// One IPv4 address of one local interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceInfo {
    pub name: String,
    pub ip: Ipv4Addr,
    pub kind: AdapterKind,
    pub is_virtual: bool,
    /// Ranking score; higher is better.
    pub score: i32,
    /// True for the top-ranked entry only.
    pub is_preferred: bool,
}

impl InterfaceInfo {
    /// `"192.168.1.50 (eth0)"`
    pub fn display_text(&self) -> String {
        format!("{} ({})", self.ip, self.name)
    }
}

/// Classifies an interface by name. VPN patterns win over virtual ones.
pub fn classify_interface(name: &str) -> (AdapterKind, bool) {
    let matches_any = |patterns: &[&str]| {
        patterns
            .iter()
            .any(|pattern| contains_ignore_ascii_case(name, pattern))
    };

    if matches_any(VPN_ADAPTER_PATTERNS) {
        return (AdapterKind::Vpn, true);
    }
    if matches_any(VIRTUAL_ADAPTER_PATTERNS) {
        return (AdapterKind::Virtual, true);
    }

    let starts_with_any = |prefixes: &[&str]| {
        prefixes
            .iter()
            .any(|prefix| starts_with_ignore_ascii_case(name, prefix))
    };

    let kind = if starts_with_any(WIFI_PREFIXES) {
        AdapterKind::WiFi
    } else if starts_with_any(ETHERNET_PREFIXES) {
        AdapterKind::Ethernet
    } else {
        AdapterKind::Other
    };
    (kind, false)
}

/// Scores one interface address. Always at least 1.
pub fn score_interface(kind: AdapterKind, is_virtual: bool, ip: Ipv4Addr) -> i32 {
    let mut score = kind.base_score();
    if is_virtual {
        score -= 60;
    }
    if is_cgnat(ip) {
        // Tailscale and carrier NAT
        score -= 30;
    }
    if ip.is_link_local() {
        // no DHCP lease
        score -= 80;
    }
    score.max(1)
}

fn is_cgnat(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    a == 100 && (64..128).contains(&b)
}

/// Ranks `(name, address)` pairs: IPv4 only, loopback dropped, sorted by
/// descending score then name, first entry marked preferred.
pub fn rank_interfaces(addresses: impl IntoIterator<Item = (String, IpAddr)>) -> Vec<InterfaceInfo> {
    let mut interfaces: Vec<InterfaceInfo> = addresses
        .into_iter()
        .filter_map(|(name, addr)| match addr {
            IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => {
                let (kind, is_virtual) = classify_interface(&name);
                Some(InterfaceInfo {
                    score: score_interface(kind, is_virtual, ip),
                    name,
                    ip,
                    kind,
                    is_virtual,
                    is_preferred: false,
                })
            }
            _ => None,
        })
        .collect();

    interfaces.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    if let Some(first) = interfaces.first_mut() {
        first.is_preferred = true;
    }
    interfaces
}

/// Errors that can occur while inspecting local interfaces.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Could not detect a local IP address.
    #[error("Failed to detect local IP: {0}")]
    Detection(String),

    /// Network interface error.
    #[error("Network interface error: {0}")]
    Interface(String),
}

/// Lists and ranks the machine's IPv4 interfaces.
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>, NetworkError> {
    let addresses = local_ip_address::list_afinet_netifas()
        .map_err(|e| NetworkError::Interface(e.to_string()))?;
    let ranked = rank_interfaces(addresses);
    for iface in &ranked {
        log::debug!(
            "[Network] {} kind={} virtual={} score={}",
            iface.display_text(),
            iface.kind,
            iface.is_virtual,
            iface.score
        );
    }
    Ok(ranked)
}

/// Returns the top-ranked interface, if any.
pub fn preferred_interface() -> Result<Option<InterfaceInfo>, NetworkError> {
    Ok(list_interfaces()?.into_iter().next())
}

/// Trait for detecting the local address to discover from.
///
/// Different environments may need different detection strategies.
pub trait IpDetector: Send + Sync {
    /// Detects the local IPv4 address.
    fn detect(&self) -> Result<Ipv4Addr, NetworkError>;
}

/// Default detector: the preferred interface, falling back to the OS's
/// default-route address.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Creates a new `LocalIpDetector` wrapped in an Arc.
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self::new())
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<Ipv4Addr, NetworkError> {
        match preferred_interface() {
            Ok(Some(iface)) => return Ok(iface.ip),
            Ok(None) => log::debug!("[Network] No ranked interface, using default route"),
            Err(e) => log::warn!("[Network] {}; using default route", e),
        }

        match local_ip_address::local_ip() {
            Ok(IpAddr::V4(ip)) => Ok(ip),
            Ok(IpAddr::V6(ip)) => Err(NetworkError::Detection(format!(
                "default route address {} is not IPv4",
                ip
            ))),
            Err(e) => Err(NetworkError::Detection(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn classifies_common_names() {
        assert_eq!(classify_interface("eth0"), (AdapterKind::Ethernet, false));
        assert_eq!(classify_interface("Ethernet 2"), (AdapterKind::Ethernet, false));
        assert_eq!(classify_interface("wlan0"), (AdapterKind::WiFi, false));
        assert_eq!(classify_interface("Wi-Fi"), (AdapterKind::WiFi, false));
        assert_eq!(classify_interface("docker0"), (AdapterKind::Virtual, true));
        assert_eq!(
            classify_interface("vEthernet (Default Switch)"),
            (AdapterKind::Virtual, true)
        );
        assert_eq!(classify_interface("tailscale0"), (AdapterKind::Vpn, true));
        assert_eq!(classify_interface("wg0"), (AdapterKind::Vpn, true));
        assert_eq!(classify_interface("bond0"), (AdapterKind::Other, false));
    }

    #[test]
    fn score_adjustments() {
        let lan = Ipv4Addr::new(192, 168, 1, 50);
        assert_eq!(score_interface(AdapterKind::Ethernet, false, lan), 100);
        assert_eq!(score_interface(AdapterKind::WiFi, false, lan), 80);
        assert_eq!(score_interface(AdapterKind::Virtual, true, lan), 1);
        assert_eq!(
            score_interface(AdapterKind::Other, false, Ipv4Addr::new(100, 101, 2, 3)),
            10
        );
        assert_eq!(
            score_interface(AdapterKind::Ethernet, false, Ipv4Addr::new(169, 254, 10, 1)),
            20
        );
        // 100.0.0.0/10 is not CGNAT
        assert_eq!(
            score_interface(AdapterKind::Ethernet, false, Ipv4Addr::new(100, 1, 2, 3)),
            100
        );
    }

    #[test]
    fn ranking_prefers_physical_lan() {
        let ranked = rank_interfaces(vec![
            ("docker0".to_string(), v4(172, 17, 0, 1)),
            ("lo".to_string(), v4(127, 0, 0, 1)),
            ("wlan0".to_string(), v4(192, 168, 1, 60)),
            ("eth0".to_string(), v4(192, 168, 1, 50)),
            ("tailscale0".to_string(), v4(100, 90, 1, 2)),
            ("eth1".to_string(), IpAddr::V6("fe80::1".parse().unwrap())),
        ]);

        let names: Vec<&str> = ranked.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["eth0", "wlan0", "docker0", "tailscale0"]);
        assert!(ranked[0].is_preferred);
        assert!(ranked[1..].iter().all(|i| !i.is_preferred));
        assert_eq!(ranked[0].display_text(), "192.168.1.50 (eth0)");
    }

    #[test]
    fn ties_are_broken_by_name() {
        let ranked = rank_interfaces(vec![
            ("eth1".to_string(), v4(10, 0, 0, 2)),
            ("eth0".to_string(), v4(10, 0, 1, 2)),
        ]);
        assert_eq!(ranked[0].name, "eth0");
    }

    #[test]
    fn empty_input_has_no_preferred() {
        assert!(rank_interfaces(Vec::new()).is_empty());
    }
}
