//! Two-phase Orsay TV discovery.
//!
//! # Architecture
//!
//! ```text
//! DiscoveryCoordinator
//! ├── SsdpBroadcaster   (M-SEARCH to 239.255.255.250:1900)
//! │   └── classify → fetch description → score
//! └── SubnetPortScanner (TCP 7676 / 8443 / 55000, semaphore-bounded)
//!     └── open ports → fetch description → score → threshold
//! ```
//!
//! # Run Pipeline
//!
//! 1. Validate the local address and options
//! 2. Broadcast phase: every vendor response is resolved and recorded as it arrives
//! 3. Port-scan phase (optional): every other host of the subnet, bounded concurrency
//! 4. Rank the merged result map
//!
//! Both phases write into one result map keyed by address. A host reported
//! by both phases is merged (method `Both`, confidence bonus) rather than
//! duplicated.

pub mod description;
pub mod probe;
pub mod profile;
pub mod results;
pub mod scanner;
pub mod scoring;
pub mod ssdp;
pub mod subnet;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use description::{parse_device_description, DescriptionFetcher};
pub use profile::{DescriptionEndpoint, VendorProfile};
pub use results::ResultMap;
pub use scanner::SubnetPortScanner;
pub use scoring::{score, ScoreSignals};
pub use ssdp::{MulticastSearcher, SsdpBroadcaster, SsdpConfig, SsdpResponse, SsdpSearcher};
pub use subnet::Subnet;
pub use transport::{NetworkTransport, ProbeTransport};
pub use types::{
    DeviceDescription, DiscoveredDevice, DiscoveryMethod, DiscoveryOptions, DiscoveryOutcome,
    DiscoveryPhase, DiscoveryProgress,
};

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use self::results::RunContext;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::events::EventEmitter;
use crate::utils::validate_device_ip;

/// Holds the single-flight flag for the duration of one run.
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Runs discovery and single-address probes against one vendor profile.
///
/// At most one discovery run is active per coordinator; probes may run at
/// any time.
pub struct DiscoveryCoordinator {
    profile: Arc<VendorProfile>,
    transport: Arc<dyn ProbeTransport>,
    broadcaster: SsdpBroadcaster,
    scanner: SubnetPortScanner,
    emitter: Arc<dyn EventEmitter>,
    running: AtomicBool,
    phase: RwLock<DiscoveryPhase>,
}

impl DiscoveryCoordinator {
    /// Creates a coordinator that talks to the real network.
    pub fn new(profile: VendorProfile, emitter: Arc<dyn EventEmitter>) -> Self {
        let transport = Arc::new(NetworkTransport::new(&profile));
        Self::with_components(
            profile,
            Arc::new(MulticastSearcher::new(SsdpConfig::default())),
            transport,
            emitter,
        )
    }

    /// Creates a coordinator with the Samsung Orsay profile and no event observer.
    pub fn with_defaults() -> Self {
        Self::new(
            VendorProfile::default(),
            Arc::new(crate::events::NoopEventEmitter),
        )
    }

    /// Creates a coordinator from explicit network components.
    pub fn with_components(
        profile: VendorProfile,
        searcher: Arc<dyn SsdpSearcher>,
        transport: Arc<dyn ProbeTransport>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let profile = Arc::new(profile);
        Self {
            broadcaster: SsdpBroadcaster::new(searcher, Arc::clone(&transport), Arc::clone(&profile)),
            scanner: SubnetPortScanner::new(Arc::clone(&transport), Arc::clone(&profile)),
            profile,
            transport,
            emitter,
            running: AtomicBool::new(false),
            phase: RwLock::new(DiscoveryPhase::Idle),
        }
    }

    pub fn profile(&self) -> &VendorProfile {
        &self.profile
    }

    /// Returns true while a discovery run is active.
    pub fn is_discovering(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Phase of the current run, or the terminal phase of the last one.
    pub fn phase(&self) -> DiscoveryPhase {
        *self.phase.read()
    }

    /// Runs one discovery from `local_address`.
    ///
    /// # Returns
    ///
    /// - `Ok` with phase `Completed`, or `Cancelled` and every device found
    ///   before `cancel` fired. Devices are sorted by descending confidence,
    ///   then ascending address.
    /// - `Err(AlreadyInProgress)` if another run is active; nothing else is
    ///   touched.
    /// - `Err` for an invalid address, invalid options or a failed worker,
    ///   after a `Failed` progress event.
    pub async fn start(
        &self,
        local_address: &str,
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
    ) -> DiscoveryResult<DiscoveryOutcome> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            log::warn!("[Discovery] Rejecting start: a run is already in progress");
            return Err(DiscoveryError::AlreadyInProgress);
        };

        let ctx = Arc::new(RunContext::new(
            Arc::clone(&self.emitter),
            self.profile.dual_method_bonus,
        ));

        log::info!(
            "[Discovery] Starting from {} (broadcast {}ms, port scan {})",
            local_address,
            options.broadcast_timeout.as_millis(),
            if options.enable_port_scan { "on" } else { "off" }
        );
        self.set_phase(DiscoveryPhase::Starting);
        ctx.report(DiscoveryPhase::Starting, 0, "Starting discovery...", None);

        match self.run(local_address, options, cancel, &ctx).await {
            Ok(()) => {
                let devices = ctx.results().sorted();
                let (phase, message) = if cancel.is_cancelled() {
                    (
                        DiscoveryPhase::Cancelled,
                        format!("Discovery cancelled, {} TV(s) found", devices.len()),
                    )
                } else {
                    (
                        DiscoveryPhase::Completed,
                        format!("Discovery complete, {} TV(s) found", devices.len()),
                    )
                };

                log::info!("[Discovery] {}", message);
                ctx.finish(phase, message);
                self.set_phase(phase);
                Ok(DiscoveryOutcome { phase, devices })
            }
            Err(e) => {
                log::error!("[Discovery] Discovery failed: {}", e);
                ctx.finish(DiscoveryPhase::Failed, format!("Discovery failed: {}", e));
                self.set_phase(DiscoveryPhase::Failed);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        local_address: &str,
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
        ctx: &Arc<RunContext>,
    ) -> DiscoveryResult<()> {
        options.validate().map_err(DiscoveryError::InvalidOptions)?;
        let local_ip = parse_local_address(local_address)?;
        let subnet = Subnet::new(local_ip, options.subnet_mask)
            .map_err(DiscoveryError::InvalidOptions)?;

        if cancel.is_cancelled() {
            return Ok(());
        }

        self.set_phase(DiscoveryPhase::SsdpBroadcast);
        ctx.report(DiscoveryPhase::SsdpBroadcast, 10, "Sending SSDP discovery...", None);

        let found = self
            .broadcaster
            .run(local_ip, options.broadcast_timeout, cancel, ctx)
            .await;

        self.set_phase(DiscoveryPhase::SsdpListening);
        ctx.report(
            DiscoveryPhase::SsdpListening,
            40,
            format!("SSDP found {} device(s)", found),
            None,
        );

        if cancel.is_cancelled() || !options.enable_port_scan {
            return Ok(());
        }

        self.set_phase(DiscoveryPhase::PortProbing);
        ctx.report(DiscoveryPhase::PortProbing, 50, "Scanning subnet...", None);

        let mut exclude = ctx.results().addresses();
        exclude.insert(local_ip);
        self.scanner
            .run(&subnet, &exclude, options, cancel, ctx)
            .await?;

        Ok(())
    }

    /// Verifies a single address. Does not take part in single-flight.
    pub async fn probe(&self, address: &str, cancel: &CancellationToken) -> Option<DiscoveredDevice> {
        probe::probe_address(address, &self.profile, self.transport.as_ref(), cancel).await
    }

    fn set_phase(&self, phase: DiscoveryPhase) {
        *self.phase.write() = phase;
    }
}

fn parse_local_address(local_address: &str) -> DiscoveryResult<Ipv4Addr> {
    validate_device_ip(local_address).map_err(|e| DiscoveryError::InvalidAddress(e.to_string()))
}
