// # Address Probe Trait
//
// The I/O seam of the address resolver: a probe turns one
// [`AddressService`] descriptor into an address.
//
// ## Implementations
//
// - HTTP services: `ddns-ip-http` crate
// - Local interfaces: `ddns-ip-interface` crate

use async_trait::async_trait;
use std::net::IpAddr;

use crate::address::AddressService;

/// Trait for address probe implementations
///
/// A probe performs exactly one bounded attempt per call. Fallback across
/// services is owned by [`AddressResolver`](crate::address::AddressResolver).
#[async_trait]
pub trait AddressProbe: Send + Sync {
    /// Whether this probe knows how to query `service`
    fn supports(&self, service: &AddressService) -> bool;

    /// Query `service` once and return an address of `service.version`
    async fn probe(&self, service: &AddressService) -> Result<IpAddr, crate::Error>;

    /// Get the probe name (for logging/debugging)
    fn probe_name(&self) -> &'static str;
}
