//! UPnP device description retrieval.
//!
//! A TV's description document is fetched over plain HTTP, first from the URL
//! its SSDP response advertised (if any) and then from the vendor's
//! well-known endpoints. The first candidate that returns a parseable
//! `<device>` wins. Nothing here fails loudly: an unreachable TV simply has no
//! description.

use std::borrow::Cow;
use std::time::Duration;

use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::profile::DescriptionEndpoint;
use super::types::DeviceDescription;

/// Timeout for one description request.
pub const DESCRIPTION_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Fetches description documents from a candidate's endpoints.
#[derive(Debug, Clone)]
pub struct DescriptionFetcher {
    client: Client,
    endpoints: Vec<DescriptionEndpoint>,
}

impl DescriptionFetcher {
    /// Creates a fetcher for the given vendor endpoints.
    pub fn new(endpoints: Vec<DescriptionEndpoint>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!(
                    "[Description] Failed to build HTTP client with custom timeout: {}. Using default.",
                    e
                );
                Client::default()
            });

        Self { client, endpoints }
    }

    /// URLs tried for one host: the advertised location, then each vendor endpoint.
    pub fn candidate_urls(&self, address: &str, location: Option<&str>) -> Vec<String> {
        location
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .into_iter()
            .chain(self.endpoints.iter().map(|endpoint| endpoint.url(address)))
            .collect()
    }

    /// Returns the first description found, or `None` if every candidate fails
    /// or the run is cancelled.
    pub async fn fetch(
        &self,
        address: &str,
        location: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<DeviceDescription> {
        for url in self.candidate_urls(address, location) {
            if cancel.is_cancelled() {
                return None;
            }

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                result = self.fetch_url(&url) => result,
            };

            if let Some(description) = attempt {
                log::debug!("[Description] {} described by {}", address, url);
                return Some(description);
            }
        }

        log::trace!("[Description] No description found for {}", address);
        None
    }

    async fn fetch_url(&self, url: &str) -> Option<DeviceDescription> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                log::trace!("[Description] GET {} failed: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            log::trace!("[Description] GET {} returned {}", url, response.status());
            return None;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                log::trace!("[Description] Failed to read body from {}: {}", url, e);
                return None;
            }
        };

        if body.trim().is_empty() {
            return None;
        }

        parse_device_description(&body)
    }
}

/// Parses the identity fields of the first `<device>` element.
///
/// Only direct children of that element are read, so embedded devices in a
/// `<deviceList>` never override the root device. Namespace prefixes are
/// ignored. Returns `None` if no field was found.
pub fn parse_device_description(xml: &str) -> Option<DeviceDescription> {
    let mut reader = Reader::from_str(xml);
    let mut description = DeviceDescription::default();
    let mut depth = 0usize;
    let mut device_depth: Option<usize> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                match device_depth {
                    None if e.local_name().as_ref() == b"device" => device_depth = Some(depth),
                    Some(root) if depth == root + 1 => {
                        let slot = match e.local_name().as_ref() {
                            b"friendlyName" => &mut description.friendly_name,
                            b"modelName" => &mut description.model_name,
                            b"modelNumber" => &mut description.model_number,
                            b"serialNumber" => &mut description.serial_number,
                            b"manufacturer" => &mut description.manufacturer,
                            _ => continue,
                        };

                        // read_text consumes the matching end tag
                        let text = reader.read_text(e.name());
                        depth -= 1;
                        match text {
                            Ok(text) => {
                                if slot.is_none() {
                                    *slot = clean_text(&text);
                                }
                            }
                            Err(err) => {
                                log::trace!("[Description] Malformed field: {:?}", err);
                                break;
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                if device_depth == Some(depth) {
                    break;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::trace!("[Description] Error parsing device description: {:?}", e);
                break;
            }
            _ => {}
        }
    }

    (!description.is_empty()).then_some(description)
}

fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let text = unescape(trimmed).unwrap_or(Cow::Borrowed(trimmed));
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::test_fixtures::{
        orsay_description, DESCRIPTION_XML_EMBEDDED, DESCRIPTION_XML_ORSAY,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `/desc` (the Orsay description), `/empty` (200 with no body)
    /// and 404 for anything else. Returns the port and the paths requested.
    async fn serve_descriptions() -> (u16, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let request = String::from_utf8_lossy(&request);
                    let path = request.split_whitespace().nth(1).unwrap_or("").to_string();
                    seen.lock().push(path.clone());

                    let (status, body) = match path.as_str() {
                        "/desc" => ("200 OK", DESCRIPTION_XML_ORSAY),
                        "/empty" => ("200 OK", ""),
                        _ => ("404 Not Found", "not found"),
                    };
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (port, requests)
    }

    #[test]
    fn parses_orsay_description() {
        let description = parse_device_description(DESCRIPTION_XML_ORSAY).unwrap();
        assert_eq!(description, orsay_description());
    }

    #[test]
    fn embedded_devices_do_not_override_root() {
        let description = parse_device_description(DESCRIPTION_XML_EMBEDDED).unwrap();
        assert_eq!(description.friendly_name.as_deref(), Some("Living Room TV"));
        assert_eq!(description.manufacturer.as_deref(), Some("Samsung Electronics"));
        // only the embedded renderer carries a model name
        assert_eq!(description.model_name, None);
    }

    #[test]
    fn entities_are_unescaped_and_whitespace_trimmed() {
        let xml = r#"<root><device>
            <friendlyName>
                Tom &amp; Jerry&apos;s TV
            </friendlyName>
            <modelName>   </modelName>
        </device></root>"#;
        let description = parse_device_description(xml).unwrap();
        assert_eq!(description.friendly_name.as_deref(), Some("Tom & Jerry's TV"));
        assert_eq!(description.model_name, None);
    }

    #[test]
    fn namespaced_elements_match_by_local_name() {
        let xml = r#"<u:root xmlns:u="urn:schemas-upnp-org:device-1-0">
            <u:device><u:modelName>UN46ES6500</u:modelName></u:device>
        </u:root>"#;
        let description = parse_device_description(xml).unwrap();
        assert_eq!(description.model_name.as_deref(), Some("UN46ES6500"));
    }

    #[test]
    fn no_device_or_garbage_yields_none() {
        assert!(parse_device_description("").is_none());
        assert!(parse_device_description("not xml at all").is_none());
        assert!(parse_device_description("<root><specVersion/></root>").is_none());
        assert!(parse_device_description("<root><device></device></root>").is_none());
    }

    #[test]
    fn location_is_tried_before_vendor_endpoints() {
        let fetcher = DescriptionFetcher::new(
            vec![
                DescriptionEndpoint::new(7676, "/smp_4_"),
                DescriptionEndpoint::new(9197, "/dmr"),
            ],
            DESCRIPTION_FETCH_TIMEOUT,
        );

        let urls = fetcher.candidate_urls("192.168.1.20", Some(" http://192.168.1.20:7676/smp_2_ "));
        assert_eq!(
            urls,
            vec![
                "http://192.168.1.20:7676/smp_2_",
                "http://192.168.1.20:7676/smp_4_",
                "http://192.168.1.20:9197/dmr",
            ]
        );
        assert_eq!(fetcher.candidate_urls("10.0.0.2", Some("")).len(), 2);
    }

    #[tokio::test]
    async fn cancelled_fetch_returns_none() {
        let fetcher = DescriptionFetcher::new(
            vec![DescriptionEndpoint::new(7676, "/smp_4_")],
            DESCRIPTION_FETCH_TIMEOUT,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(fetcher.fetch("192.0.2.1", None, &cancel).await.is_none());
    }

    #[tokio::test]
    async fn fetch_falls_through_to_first_successful_candidate() {
        let (port, requests) = serve_descriptions().await;
        let fetcher = DescriptionFetcher::new(
            vec![
                DescriptionEndpoint::new(port, "/empty"),
                DescriptionEndpoint::new(port, "/desc"),
                DescriptionEndpoint::new(port, "/never"),
            ],
            DESCRIPTION_FETCH_TIMEOUT,
        );
        let location = format!("http://127.0.0.1:{}/smp_2_", port);

        let description = fetcher
            .fetch("127.0.0.1", Some(&location), &CancellationToken::new())
            .await;

        assert_eq!(description, Some(orsay_description()));
        // 404 on the location, empty body on the first endpoint, stop at the first hit
        assert_eq!(*requests.lock(), vec!["/smp_2_", "/empty", "/desc"]);
    }

    #[tokio::test]
    async fn unreachable_and_empty_candidates_yield_none() {
        let (port, requests) = serve_descriptions().await;
        let closed = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let fetcher = DescriptionFetcher::new(
            vec![
                DescriptionEndpoint::new(closed, "/desc"),
                DescriptionEndpoint::new(port, "/empty"),
            ],
            DESCRIPTION_FETCH_TIMEOUT,
        );

        let description = fetcher
            .fetch("127.0.0.1", None, &CancellationToken::new())
            .await;

        assert!(description.is_none());
        assert_eq!(*requests.lock(), vec!["/empty"]);
    }
}
