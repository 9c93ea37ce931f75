//! Per-run result map and progress reporting.
//!
//! Both discovery phases write into one [`ResultMap`]. An address is inserted
//! once; a second report for the same address is folded in with
//! [`DiscoveredDevice::merge`] under the map's entry lock, so concurrent scan
//! workers and the broadcast phase never overwrite each other.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::types::{DiscoveredDevice, DiscoveryPhase, DiscoveryProgress};
use crate::events::EventEmitter;

/// Devices found in one run, keyed by address.
#[derive(Debug, Default)]
pub struct ResultMap {
    devices: DashMap<String, DiscoveredDevice>,
}

impl ResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a device, or merges it into the existing entry for its address.
    ///
    /// Returns the stored device after the insert or merge.
    pub fn upsert(&self, device: DiscoveredDevice, bonus: u8) -> DiscoveredDevice {
        match self.devices.entry(device.address.clone()) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().merge(&device, bonus);
                existing.get().clone()
            }
            Entry::Vacant(slot) => slot.insert(device).value().clone(),
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.devices.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Addresses already found, parsed as IPv4.
    pub fn addresses(&self) -> HashSet<Ipv4Addr> {
        self.devices
            .iter()
            .filter_map(|entry| entry.key().parse().ok())
            .collect()
    }

    /// Snapshot sorted by descending confidence, then ascending address.
    pub fn sorted(&self) -> Vec<DiscoveredDevice> {
        let mut devices: Vec<DiscoveredDevice> =
            self.devices.iter().map(|entry| entry.value().clone()).collect();
        devices.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then_with(|| compare_addresses(&a.address, &b.address))
        });
        devices
    }
}

/// Numeric order for IPv4 addresses, so `.9` sorts before `.30`.
fn compare_addresses(a: &str, b: &str) -> Ordering {
    match (a.parse::<Ipv4Addr>(), b.parse::<Ipv4Addr>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Shared state of one discovery run: the result map plus event reporting.
pub(crate) struct RunContext {
    results: ResultMap,
    emitter: Arc<dyn EventEmitter>,
    dual_method_bonus: u8,
    /// Highest percent reported so far. Held while emitting so progress
    /// events leave in order.
    last_percent: Mutex<u8>,
}

impl RunContext {
    pub(crate) fn new(emitter: Arc<dyn EventEmitter>, dual_method_bonus: u8) -> Self {
        Self {
            results: ResultMap::new(),
            emitter,
            dual_method_bonus,
            last_percent: Mutex::new(0),
        }
    }

    pub(crate) fn results(&self) -> &ResultMap {
        &self.results
    }

    /// Stores a find and reports the stored (possibly merged) device.
    pub(crate) fn record(&self, device: DiscoveredDevice) -> DiscoveredDevice {
        let stored = self.results.upsert(device, self.dual_method_bonus);
        log::info!(
            "[Discovery] Found {} (confidence {}%, via {})",
            stored.display_text(),
            stored.confidence,
            stored.method
        );
        self.emitter.emit_device_found(stored.clone());
        stored
    }

    /// Emits a progress event. `percent` is raised to the last reported value
    /// if it would go backwards.
    pub(crate) fn report(
        &self,
        phase: DiscoveryPhase,
        percent: u8,
        message: impl Into<String>,
        current_address: Option<String>,
    ) -> u8 {
        let mut last = self.last_percent.lock();
        let percent = percent.min(100).max(*last);
        *last = percent;

        self.emitter.emit_progress(DiscoveryProgress {
            phase,
            percent,
            message: message.into(),
            devices_found: self.results.len(),
            current_address,
        });
        percent
    }

    /// Emits the terminal progress event. Only `Completed` jumps to 100;
    /// `Cancelled` and `Failed` stay at the last reached percent.
    pub(crate) fn finish(&self, phase: DiscoveryPhase, message: impl Into<String>) -> u8 {
        let percent = if phase == DiscoveryPhase::Completed { 100 } else { 0 };
        self.report(phase, percent, message, None)
    }
}
