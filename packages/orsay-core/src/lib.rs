//! Orsay Core - TV discovery engine for the Orsay installer.
//!
//! Finds legacy Samsung "Orsay" Smart TVs (2012-2015) on the local network so
//! an installer can target one without the user typing an IP address.
//!
//! # Architecture
//!
//! - [`discovery`]: two-phase discovery (SSDP broadcast, then subnet port scan),
//!   description fetching, confidence scoring and the single-address probe
//! - [`events`]: observer trait and broadcast bridge for progress and finds
//! - [`network`]: local interface ranking and IP detection
//! - [`error`]: centralized error types
//!
//! # Abstraction Traits
//!
//! - [`EventEmitter`](events::EventEmitter): reporting finds and progress
//! - [`SsdpSearcher`](discovery::SsdpSearcher): the SSDP socket side
//! - [`ProbeTransport`](discovery::ProbeTransport): TCP connects and description fetches
//! - [`IpDetector`](network::IpDetector): local IP detection
//!
//! Each trait has a default implementation that talks to the real network.

#![warn(clippy::all)]

pub mod discovery;
pub mod error;
pub mod events;
pub mod network;
pub mod utils;

// Re-export commonly used types at the crate root
pub use discovery::{
    DiscoveredDevice, DiscoveryCoordinator, DiscoveryMethod, DiscoveryOptions, DiscoveryOutcome,
    DiscoveryPhase, DiscoveryProgress, VendorProfile,
};
pub use error::{DiscoveryError, DiscoveryResult, ErrorCode};
pub use events::{BroadcastEventBridge, DiscoveryEvent, EventEmitter, LoggingEventEmitter, NoopEventEmitter};
pub use network::{InterfaceInfo, IpDetector, LocalIpDetector, NetworkError};
