//! Event system for discovery observers.
//!
//! This module provides:
//! - [`EventEmitter`] trait the discovery engine reports through
//! - [`BroadcastEventBridge`] for callers that prefer to drain a channel
//! - [`DiscoveryEvent`], the single event type on the channel
//!
//! Events fire on the runtime's worker threads. UI front ends marshal them
//! onto their own thread.

mod bridge;
mod emitter;

pub use bridge::{BroadcastEventBridge, DEFAULT_EVENT_CAPACITY};
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::discovery::{DiscoveredDevice, DiscoveryProgress};

/// Events emitted during a discovery run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiscoveryEvent {
    /// A device was accepted, or an existing one was confirmed by the other phase.
    DeviceFound {
        device: DiscoveredDevice,
    },
    /// Phase or percent changed.
    ProgressChanged {
        progress: DiscoveryProgress,
    },
}
