//! Centralized error types for the discovery engine.
//!
//! Only a few of these ever reach a caller of
//! [`DiscoveryCoordinator::start`](crate::DiscoveryCoordinator::start): a rejected
//! concurrent run and the faults that abort a run. Transport failures are
//! produced inside the phases, logged, and treated as "no signal".
//! Cancellation is not an error at all.

use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for front ends and logs.
    fn code(&self) -> &'static str;
}

/// Errors that can occur during discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Another discovery run is active.
    #[error("discovery already in progress")]
    AlreadyInProgress,

    /// The local address to discover from is not a usable IPv4 address.
    #[error("invalid local address: {0}")]
    InvalidAddress(String),

    /// The run options cannot be used.
    #[error("invalid discovery options: {0}")]
    InvalidOptions(String),

    /// A port-scan worker panicked or was torn down.
    #[error("discovery worker failed: {0}")]
    WorkerFailed(String),

    /// Failed to create or bind the SSDP socket.
    #[error("failed to bind UDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// Failed to join the SSDP multicast group.
    #[error("failed to join multicast group: {0}")]
    MulticastJoin(#[source] std::io::Error),

    /// Every M-SEARCH send failed.
    #[error("failed to send SSDP search: {0}")]
    SendSearch(#[source] std::io::Error),
}

impl DiscoveryError {
    /// Returns true for failures that the phases absorb instead of aborting the run.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::SocketBind(_) | Self::MulticastJoin(_) | Self::SendSearch(_)
        )
    }
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::AlreadyInProgress => "discovery_in_progress",
            Self::InvalidAddress(_) => "invalid_local_address",
            Self::InvalidOptions(_) => "invalid_options",
            Self::WorkerFailed(_) => "worker_failed",
            Self::SocketBind(_) => "socket_bind_failed",
            Self::MulticastJoin(_) => "multicast_join_failed",
            Self::SendSearch(_) => "ssdp_send_failed",
        }
    }
}

/// Convenient Result alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
