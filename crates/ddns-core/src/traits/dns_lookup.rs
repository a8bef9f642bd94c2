// # Live DNS Lookup
//
// Resolves what a full domain currently points at, independently of the
// provider API, so the reconciler can detect drift.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

use crate::task::IpVersion;

/// Trait for live DNS resolution
///
/// Failures are not errors here: anything that prevents an answer yields
/// `None` ("no live answer").
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// First address of `version` that `domain` resolves to
    async fn lookup(&self, domain: &str, version: IpVersion) -> Option<IpAddr>;
}

/// Lookup through the operating system resolver
#[derive(Debug, Clone)]
pub struct SystemDnsLookup {
    timeout: Duration,
}

impl SystemDnsLookup {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DnsLookup for SystemDnsLookup {
    async fn lookup(&self, domain: &str, version: IpVersion) -> Option<IpAddr> {
        match tokio::time::timeout(self.timeout, tokio::net::lookup_host((domain, 0))).await {
            Ok(Ok(addrs)) => addrs.map(|sa| sa.ip()).find(|ip| version.matches(ip)),
            Ok(Err(e)) => {
                tracing::debug!(domain, error = %e, "Live DNS lookup failed");
                None
            }
            Err(_) => {
                tracing::debug!(domain, "Live DNS lookup timed out");
                None
            }
        }
    }
}
