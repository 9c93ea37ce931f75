//! Event emitter abstraction for decoupling discovery from delivery.
//!
//! The discovery engine depends on the [`EventEmitter`] trait rather than on a
//! concrete channel, so a CLI, a desktop UI and the tests can each observe a
//! run in their own way.

use crate::discovery::{DiscoveredDevice, DiscoveryProgress};

/// Trait for reporting discovery events without knowledge of transport.
///
/// Implementations are called from whichever runtime worker produced the
/// event and must not block. Calls for a single run never overlap for
/// progress; device events may arrive from several scan workers at once.
///
/// # Example
///
/// ```ignore
/// struct TvList {
///     rows: Mutex<Vec<DiscoveredDevice>>,
/// }
///
/// impl EventEmitter for TvList {
///     fn emit_device_found(&self, device: DiscoveredDevice) {
///         self.rows.lock().push(device);
///     }
///     fn emit_progress(&self, _progress: DiscoveryProgress) {}
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a device that was accepted, or re-emits one confirmed by both phases.
    fn emit_device_found(&self, device: DiscoveredDevice);

    /// Emits a progress snapshot.
    fn emit_progress(&self, progress: DiscoveryProgress);
}

/// No-op emitter for callers that only want the final result.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_device_found(&self, _device: DiscoveredDevice) {
        // No-op
    }

    fn emit_progress(&self, _progress: DiscoveryProgress) {
        // No-op
    }
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_device_found(&self, device: DiscoveredDevice) {
        tracing::debug!(
            address = %device.address,
            confidence = device.confidence,
            method = %device.method,
            "device_found"
        );
    }

    fn emit_progress(&self, progress: DiscoveryProgress) {
        tracing::debug!(phase = %progress.phase, percent = progress.percent, "discovery_progress");
    }
}
