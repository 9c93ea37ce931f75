//! Bridge implementation that maps emitter calls onto a broadcast channel.
//!
//! The [`BroadcastEventBridge`] lets callers consume a run as a stream of
//! [`DiscoveryEvent`]s instead of implementing [`EventEmitter`] themselves.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::emitter::EventEmitter;
use super::DiscoveryEvent;
use crate::discovery::{DiscoveredDevice, DiscoveryProgress};

/// Default channel capacity; a full /24 scan emits a few hundred progress events.
pub const DEFAULT_EVENT_CAPACITY: usize = 512;

/// Bridges discovery events to a `tokio::sync::broadcast` channel.
///
/// The bridge also forwards to an optional external emitter that can be set
/// after construction, e.g. a UI handle that is not available at startup.
///
/// Slow subscribers lag rather than block the engine: a full channel drops the
/// oldest events for that subscriber.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<DiscoveryEvent>,
    /// Optional external emitter for platform-specific event delivery
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that receives every event before the channel does.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.tx.subscribe()
    }

    /// Returns a new subscription as a `Stream`.
    ///
    /// Lagged subscribers see `Err(BroadcastStreamRecvError::Lagged(n))` items.
    pub fn stream(&self) -> BroadcastStream<DiscoveryEvent> {
        BroadcastStream::new(self.tx.subscribe())
    }
}

impl Default for BroadcastEventBridge {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $payload_ty:ty, $variant:ident, $field:ident) => {
        fn $method(&self, $field: $payload_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method($field.clone());
            }
            if let Err(e) = self.tx.send(DiscoveryEvent::$variant { $field }) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_device_found, DiscoveredDevice, DeviceFound, device);
    impl_emit!(emit_progress, DiscoveryProgress, ProgressChanged, progress);
}
