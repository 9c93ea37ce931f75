//! General utilities shared across the discovery engine.

use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// ASCII Case-Insensitive Helpers
// ─────────────────────────────────────────────────────────────────────────────
//
// These avoid allocations from to_lowercase() while classifying and scoring
// SSDP responses. Signature tokens and HTTP headers are ASCII.

/// Checks if `haystack` contains `needle` (ASCII case-insensitive, no allocation).
#[inline]
pub fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    find_ignore_ascii_case(haystack, needle).is_some()
}

/// Checks if `s` starts with `prefix` (ASCII case-insensitive, no allocation).
#[inline]
pub fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Finds the byte index of `needle` in `haystack` (ASCII case-insensitive, no allocation).
/// Returns the index of the first match, or None if not found.
#[inline]
pub fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

// ─────────────────────────────────────────────────────────────────────────────
// IP Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Reasons a user-supplied device address is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IpValidationError {
    #[error("'{0}' is not a valid IPv4 address")]
    Malformed(String),
    #[error("{0} is a loopback address")]
    Loopback(Ipv4Addr),
    #[error("{0} is the unspecified address")]
    Unspecified(Ipv4Addr),
    #[error("{0} is a broadcast address")]
    Broadcast(Ipv4Addr),
    #[error("{0} is a multicast address")]
    Multicast(Ipv4Addr),
}

/// Parses and validates the address of a device on the LAN.
///
/// Only unicast IPv4 is accepted; the legacy TVs have no IPv6 stack.
pub fn validate_device_ip(input: &str) -> Result<Ipv4Addr, IpValidationError> {
    let ip: Ipv4Addr = input
        .trim()
        .parse()
        .map_err(|_| IpValidationError::Malformed(input.to_string()))?;

    if ip.is_loopback() {
        return Err(IpValidationError::Loopback(ip));
    }
    if ip.is_unspecified() {
        return Err(IpValidationError::Unspecified(ip));
    }
    if ip.is_broadcast() {
        return Err(IpValidationError::Broadcast(ip));
    }
    if ip.is_multicast() {
        return Err(IpValidationError::Multicast(ip));
    }
    Ok(ip)
}
