// # HTTP Address Probe
//
// Asks a "what is my IP" web service for the host's public address.
//
// ## Behavior
//
// - One GET per probe, no caching: the resolver decides when to ask
// - Non-2xx responses are failures
// - The body may be a bare address or free text containing one; the first
//   address of the requested family is extracted
//
// Services reply in different formats (plain text, HTML, "当前 IP：x.x.x.x"),
// so the body is never parsed as a whole.

use async_trait::async_trait;
use ddns_core::address::{AddressService, ServiceKind, extract_address};
use ddns_core::traits::AddressProbe;
use ddns_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Per-request timeout applied by the HTTP client
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Some services return HTML unless they see a command-line client
const USER_AGENT: &str = "curl/7.64.1";

/// HTTP-based address probe
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &str, service: &AddressService) -> Result<IpAddr> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/plain")
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: request failed: {}", service.name, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::address_source(format!(
                "{} answered HTTP {}",
                service.name, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("{}: failed to read body: {}", service.name, e)))?;

        extract_address(&body, service.version).ok_or_else(|| {
            Error::address_source(format!(
                "{} returned no {} address: {:?}",
                service.name,
                service.version.as_str(),
                truncate(body.trim(), 64)
            ))
        })
    }
}

#[async_trait]
impl AddressProbe for HttpProbe {
    fn supports(&self, service: &AddressService) -> bool {
        matches!(service.kind, ServiceKind::Http { .. })
    }

    async fn probe(&self, service: &AddressService) -> Result<IpAddr> {
        let ServiceKind::Http { url } = &service.kind else {
            return Err(Error::address_source(format!(
                "{} is not an HTTP service",
                service
            )));
        };

        let address = self.fetch(url, service).await?;
        tracing::debug!(service = %service.name, %address, "HTTP service answered");
        Ok(address)
    }

    fn probe_name(&self) -> &'static str {
        "http"
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
