//! Shared payloads and fakes for discovery tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ssdp::{SsdpResponse, SsdpSearcher};
use super::transport::ProbeTransport;
use super::types::{DeviceDescription, DiscoveredDevice, DiscoveryProgress};
use crate::error::DiscoveryError;
use crate::events::{DiscoveryEvent, EventEmitter};

/// M-SEARCH reply from a 2013 Orsay TV's remote-control receiver.
pub(crate) const SSDP_RESPONSE_ORSAY: &str = "HTTP/1.1 200 OK\r\n\
CACHE-CONTROL: max-age=1800\r\n\
DATE: Thu, 01 Jan 2015 00:02:11 GMT\r\n\
EXT:\r\n\
LOCATION: http://192.168.1.20:7676/smp_4_\r\n\
SERVER: SHP, UPnP/1.0, Samsung UPnP SDK/1.0\r\n\
ST: urn:samsung.com:device:RemoteControlReceiver:1\r\n\
USN: uuid:0ee6b280-00fa-1000-b2a4-f47b5e1c2f3d::urn:samsung.com:device:RemoteControlReceiver:1\r\n\
\r\n";

/// M-SEARCH reply from a home router.
pub(crate) const SSDP_RESPONSE_ROUTER: &str = "HTTP/1.1 200 OK\r\n\
CACHE-CONTROL: max-age=120\r\n\
LOCATION: http://192.168.1.1:5000/rootDesc.xml\r\n\
SERVER: Linux/3.14 UPnP/1.1 MiniUPnPd/2.1\r\n\
ST: urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\n\
USN: uuid:3ddcd1d3-2380-45f5-b069-1a2b3c4d5e6f::urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\n\
\r\n";

/// Description served at `:7676/smp_4_`.
pub(crate) const DESCRIPTION_XML_ORSAY: &str = r#"<?xml version="1.0"?>
<root xmlns='urn:schemas-upnp-org:device-1-0' xmlns:sec='http://www.sec.co.kr/dlna' xmlns:dlna='urn:schemas-dlna-org:device-1-0'>
  <specVersion>
    <major>1</major>
    <minor>0</minor>
  </specVersion>
  <device>
    <deviceType>urn:samsung.com:device:RemoteControlReceiver:1</deviceType>
    <friendlyName>[TV] Living Room</friendlyName>
    <manufacturer>Samsung Electronics</manufacturer>
    <manufacturerURL>http://www.samsung.com/sec</manufacturerURL>
    <modelDescription>Samsung TV RCR</modelDescription>
    <modelName>UE40F6400</modelName>
    <modelNumber>AllShare1.0</modelNumber>
    <modelURL>http://www.samsung.com/sec</modelURL>
    <serialNumber>20090804RCR</serialNumber>
    <UDN>uuid:0ee6b280-00fa-1000-b2a4-f47b5e1c2f3d</UDN>
    <sec:deviceID>P6CDKRDJ4YAYU</sec:deviceID>
    <serviceList>
      <service>
        <serviceType>urn:samsung.com:service:MultiScreenService:1</serviceType>
        <serviceId>urn:samsung.com:serviceId:MultiScreenService</serviceId>
        <controlURL>/smp_7_</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;

/// Root device without a model name whose embedded renderer has one.
pub(crate) const DESCRIPTION_XML_EMBEDDED: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
    <deviceList>
      <device>
        <friendlyName>Embedded Renderer</friendlyName>
        <modelName>UE46F7000</modelName>
      </device>
    </deviceList>
    <friendlyName>Living Room TV</friendlyName>
    <manufacturer>Samsung Electronics</manufacturer>
  </device>
</root>"#;

/// The fields of [`DESCRIPTION_XML_ORSAY`].
pub(crate) fn orsay_description() -> DeviceDescription {
    DeviceDescription {
        friendly_name: Some("[TV] Living Room".to_string()),
        model_name: Some("UE40F6400".to_string()),
        model_number: Some("AllShare1.0".to_string()),
        serial_number: Some("20090804RCR".to_string()),
        manufacturer: Some("Samsung Electronics".to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────────

/// Replays canned SSDP responses, then waits out the window.
pub(crate) struct FakeSearcher {
    responses: Vec<(IpAddr, String)>,
    fail: bool,
    searches: AtomicUsize,
}

impl FakeSearcher {
    pub(crate) fn new(responses: Vec<(IpAddr, String)>) -> Self {
        Self {
            responses,
            fail: false,
            searches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn silent() -> Self {
        Self::new(Vec::new())
    }

    /// A searcher whose socket cannot be bound.
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::silent()
        }
    }

    pub(crate) fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SsdpSearcher for FakeSearcher {
    async fn search(
        &self,
        _local_ip: Ipv4Addr,
        window: Duration,
        cancel: &CancellationToken,
        responses: mpsc::Sender<SsdpResponse>,
    ) -> Result<(), DiscoveryError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DiscoveryError::SocketBind(io::Error::new(
                io::ErrorKind::AddrInUse,
                "address in use",
            )));
        }

        for (source, payload) in &self.responses {
            let response = SsdpResponse {
                source: *source,
                payload: payload.clone(),
            };
            if responses.send(response).await.is_err() {
                return Ok(());
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(window) => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct FakeHost {
    open_ports: Vec<u16>,
    description: Option<DeviceDescription>,
}

/// In-memory network: a fixed set of hosts with open ports and descriptions.
///
/// Records every host checked, every connect timeout used, every description
/// request, and the peak number of concurrent port checks.
#[derive(Default)]
pub(crate) struct FakeTransport {
    hosts: HashMap<Ipv4Addr, FakeHost>,
    /// Closed ports wait out the connect timeout (or cancellation).
    slow_closed: bool,
    /// Cancelled when a description is requested.
    cancel_on_describe: Option<CancellationToken>,
    checked: Mutex<HashSet<Ipv4Addr>>,
    timeouts: Mutex<Vec<Duration>>,
    description_requests: Mutex<Vec<(String, Option<String>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_host(
        mut self,
        ip: Ipv4Addr,
        open_ports: &[u16],
        description: Option<DeviceDescription>,
    ) -> Self {
        self.hosts.insert(
            ip,
            FakeHost {
                open_ports: open_ports.to_vec(),
                description,
            },
        );
        self
    }

    pub(crate) fn with_slow_closed_ports(mut self) -> Self {
        self.slow_closed = true;
        self
    }

    pub(crate) fn cancelling_on_describe(mut self, cancel: CancellationToken) -> Self {
        self.cancel_on_describe = Some(cancel);
        self
    }

    pub(crate) fn checked_hosts(&self) -> HashSet<Ipv4Addr> {
        self.checked.lock().clone()
    }

    pub(crate) fn port_timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().clone()
    }

    pub(crate) fn description_requests(&self) -> Vec<(String, Option<String>)> {
        self.description_requests.lock().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbeTransport for FakeTransport {
    async fn is_port_open(
        &self,
        ip: Ipv4Addr,
        port: u16,
        connect_timeout: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        self.checked.lock().insert(ip);
        self.timeouts.lock().push(connect_timeout);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let open = self
            .hosts
            .get(&ip)
            .is_some_and(|host| host.open_ports.contains(&port));

        if open {
            tokio::task::yield_now().await;
        } else if self.slow_closed {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(connect_timeout) => {}
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        open && !cancel.is_cancelled()
    }

    async fn fetch_description(
        &self,
        address: &str,
        location: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<DeviceDescription> {
        self.description_requests
            .lock()
            .push((address.to_string(), location.map(str::to_string)));

        if let Some(token) = &self.cancel_on_describe {
            token.cancel();
        }
        if cancel.is_cancelled() {
            return None;
        }

        let ip: Ipv4Addr = address.parse().ok()?;
        self.hosts.get(&ip).and_then(|host| host.description.clone())
    }
}

/// Records every event. Optionally cancels a token on the first device found.
#[derive(Default)]
pub(crate) struct RecordingEmitter {
    events: Mutex<Vec<DiscoveryEvent>>,
    cancel_on_found: Option<CancellationToken>,
}

impl RecordingEmitter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancelling_on_found(cancel: CancellationToken) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel_on_found: Some(cancel),
        }
    }

    pub(crate) fn devices(&self) -> Vec<DiscoveredDevice> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                DiscoveryEvent::DeviceFound { device } => Some(device.clone()),
                DiscoveryEvent::ProgressChanged { .. } => None,
            })
            .collect()
    }

    pub(crate) fn progress(&self) -> Vec<DiscoveryProgress> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                DiscoveryEvent::ProgressChanged { progress } => Some(progress.clone()),
                DiscoveryEvent::DeviceFound { .. } => None,
            })
            .collect()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_device_found(&self, device: DiscoveredDevice) {
        self.events.lock().push(DiscoveryEvent::DeviceFound { device });
        if let Some(cancel) = &self.cancel_on_found {
            cancel.cancel();
        }
    }

    fn emit_progress(&self, progress: DiscoveryProgress) {
        self.events
            .lock()
            .push(DiscoveryEvent::ProgressChanged { progress });
    }
}
