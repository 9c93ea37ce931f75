//! Vendor signature profile.
//!
//! Everything that ties the engine to one vendor's devices lives here: the
//! SSDP signature tokens, the scoring weights, the model-number grammar, the
//! port conventions and the acceptance thresholds. A profile is built once
//! and shared read-only by every phase of every run.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Samsung Orsay model names: `U` + region + size + series + model,
/// e.g. `UE40F6400`, `UN55H5500`.
///
/// Region: A=Australia, E=Europe, K=Korea, N=North America.
/// Series: E=2012, F=2013, H=2014, J=2015.
const ORSAY_MODEL_PATTERN: &str = r"(?i)U[AEKN]\d{2}[EFHJ]\d{3,5}";

fn orsay_model_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(ORSAY_MODEL_PATTERN).expect("model pattern is a valid regex"))
}

/// A device description endpoint: `http://{ip}:{port}{path}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionEndpoint {
    pub port: u16,
    pub path: String,
}

impl DescriptionEndpoint {
    pub fn new(port: u16, path: impl Into<String>) -> Self {
        Self {
            port,
            path: path.into(),
        }
    }

    /// Builds the endpoint URL for one host.
    pub fn url(&self, address: &str) -> String {
        format!("http://{}:{}{}", address, self.port, self.path)
    }
}

/// Vendor-specific constants injected into the discovery engine.
#[derive(Debug, Clone)]
pub struct VendorProfile {
    /// Any of these (case-insensitive) in an SSDP response marks it as a candidate.
    pub classifier_tokens: Vec<String>,
    /// Score added for each token present in an SSDP response.
    pub response_weights: Vec<(String, u8)>,
    /// Substring expected in the descriptor's manufacturer field.
    pub manufacturer_token: String,
    pub manufacturer_weight: u8,
    /// Model-number grammar of the target device class.
    pub model_pattern: Regex,
    pub model_pattern_weight: u8,
    /// Weaker fallback when the model does not match the grammar.
    pub generic_model_token: String,
    pub generic_model_weight: u8,
    /// Score added when the descriptor carries a friendly name.
    pub friendly_name_weight: u8,
    /// Score added per open vendor port.
    pub port_weights: Vec<(u16, u8)>,
    /// Ports checked by a single-address probe.
    pub standard_ports: Vec<u16>,
    /// Connect timeout used by a single-address probe.
    pub probe_port_timeout: Duration,
    /// Vendor description URLs, tried in order after any SSDP `LOCATION`.
    pub description_endpoints: Vec<DescriptionEndpoint>,
    /// Minimum score for a port-scan find. Tunable; 40 in the field.
    pub port_scan_threshold: u8,
    /// Minimum score for a single-address probe.
    pub probe_threshold: u8,
    /// Added when both phases report the same address. Tunable; 20 in the field.
    pub dual_method_bonus: u8,
}

impl VendorProfile {
    /// Samsung Orsay (2012-2015 Smart TV platform) profile.
    pub fn samsung_orsay() -> Self {
        Self {
            classifier_tokens: [
                "samsung",
                "sec:",
                "schemas-upnp-org:device:MediaRenderer",
                "urn:samsung.com",
                "allshare",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            response_weights: vec![
                ("samsung".to_string(), 30),
                ("sec:".to_string(), 20),
                ("allshare".to_string(), 15),
                // Orsay's OS name
                ("bada".to_string(), 25),
            ],
            manufacturer_token: "samsung".to_string(),
            manufacturer_weight: 30,
            model_pattern: orsay_model_pattern().clone(),
            model_pattern_weight: 40,
            generic_model_token: "TV".to_string(),
            generic_model_weight: 10,
            friendly_name_weight: 5,
            // 7676 AllShare UPnP, 55000 Orsay remote control, 8443 SERI SSL
            port_weights: vec![(7676, 35), (55000, 30), (8443, 25)],
            standard_ports: vec![7676, 8443, 55000],
            probe_port_timeout: Duration::from_secs(2),
            description_endpoints: vec![
                DescriptionEndpoint::new(7676, "/smp_4_"),
                DescriptionEndpoint::new(7676, "/smp_2_"),
                DescriptionEndpoint::new(9197, "/dmr"),
            ],
            port_scan_threshold: 40,
            probe_threshold: 30,
            dual_method_bonus: 20,
        }
    }

    /// Replaces the model-number grammar.
    pub fn with_model_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.model_pattern = Regex::new(pattern)?;
        Ok(self)
    }
}

impl Default for VendorProfile {
    fn default() -> Self {
        Self::samsung_orsay()
    }
}
