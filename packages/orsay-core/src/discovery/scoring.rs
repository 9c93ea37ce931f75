//! Confidence scoring for TV candidates.
//!
//! Combines three independent signal groups into a 0-100 score:
//!
//! | Signal group | Source |
//! |---|---|
//! | response tokens | raw SSDP response (broadcast phase only) |
//! | descriptor fields | manufacturer, model grammar, friendly name |
//! | open ports | vendor-standard TCP ports (port scan / probe) |
//!
//! Every weight comes from the [`VendorProfile`]; the function has no other
//! inputs and no state.

use super::profile::VendorProfile;
use super::types::DeviceDescription;
use crate::utils::contains_ignore_ascii_case;

/// Everything a phase knows about one candidate address.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreSignals<'a> {
    pub ssdp_response: Option<&'a str>,
    pub description: Option<&'a DeviceDescription>,
    pub open_ports: &'a [u16],
}

/// Scores a candidate. Deterministic; the result is always in `0..=100`.
pub fn score(profile: &VendorProfile, signals: &ScoreSignals<'_>) -> u8 {
    let mut total: u32 = 0;

    if let Some(response) = signals.ssdp_response.filter(|r| !r.is_empty()) {
        total += profile
            .response_weights
            .iter()
            .filter(|(token, _)| contains_ignore_ascii_case(response, token))
            .map(|(_, weight)| u32::from(*weight))
            .sum::<u32>();
    }

    if let Some(description) = signals.description {
        total += description_score(profile, description);
    }

    total += profile
        .port_weights
        .iter()
        .filter(|(port, _)| signals.open_ports.contains(port))
        .map(|(_, weight)| u32::from(*weight))
        .sum::<u32>();

    total.min(100) as u8
}

fn description_score(profile: &VendorProfile, description: &DeviceDescription) -> u32 {
    let mut total = 0u32;

    if description
        .manufacturer
        .as_deref()
        .is_some_and(|m| contains_ignore_ascii_case(m, &profile.manufacturer_token))
    {
        total += u32::from(profile.manufacturer_weight);
    }

    let model_name = description.model_name.as_deref().filter(|m| !m.is_empty());
    let grammar_match = [model_name, description.model_number.as_deref()]
        .into_iter()
        .flatten()
        .any(|model| profile.model_pattern.is_match(model));

    if grammar_match {
        total += u32::from(profile.model_pattern_weight);
    } else if model_name.is_some_and(|m| contains_ignore_ascii_case(m, &profile.generic_model_token))
    {
        total += u32::from(profile.generic_model_weight);
    }

    if description
        .friendly_name
        .as_deref()
        .is_some_and(|n| !n.is_empty())
    {
        total += u32::from(profile.friendly_name_weight);
    }

    total
}
