// # Interface Address Probe
//
// Reads the address of a local network interface instead of asking a web
// service. Used for hosts whose public address is assigned directly to an
// interface (PPPoE links, routed IPv6 prefixes).
//
// Interfaces are addressed as `iface://<name>` service URLs.
//
// ## Selection Rules
//
// - Interfaces that are down or loopback are ignored
// - IPv6 link-local addresses (fe80::/10) are ignored
// - The first remaining address of the requested family wins

use async_trait::async_trait;
use ddns_core::address::{AddressService, ServiceKind};
use ddns_core::task::IpVersion;
use ddns_core::traits::AddressProbe;
use ddns_core::{Error, Result};

use std::net::{IpAddr, Ipv6Addr};

/// One address assigned to a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub interface: String,
    pub address: IpAddr,
    pub up: bool,
    pub loopback: bool,
}

impl InterfaceAddress {
    /// Whether this address may be published
    pub fn is_usable(&self) -> bool {
        self.up && !self.loopback && !is_link_local(&self.address)
    }
}

/// Local interface address probe
#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceProbe;

impl InterfaceProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AddressProbe for InterfaceProbe {
    fn supports(&self, service: &AddressService) -> bool {
        matches!(service.kind, ServiceKind::Interface { .. })
    }

    async fn probe(&self, service: &AddressService) -> Result<IpAddr> {
        let ServiceKind::Interface { name } = &service.kind else {
            return Err(Error::address_source(format!("{} is not an interface", service)));
        };

        let addresses = tokio::task::spawn_blocking(os::interface_addresses)
            .await
            .map_err(|e| Error::Other(format!("Interface scan panicked: {}", e)))??;

        pick_address(&addresses, name, service.version)
    }

    fn probe_name(&self) -> &'static str {
        "interface"
    }
}

/// Every address on every local interface
pub fn interface_addresses() -> Result<Vec<InterfaceAddress>> {
    os::interface_addresses()
}

fn pick_address(addresses: &[InterfaceAddress], name: &str, version: IpVersion) -> Result<IpAddr> {
    let mut seen = false;
    for entry in addresses.iter().filter(|a| a.interface == name) {
        seen = true;
        if entry.is_usable() && version.matches(&entry.address) {
            tracing::debug!(interface = name, address = %entry.address, "Interface address selected");
            return Ok(entry.address);
        }
    }

    if !seen {
        return Err(Error::address_source(format!("Interface {} not found", name)));
    }
    Err(Error::address_source(format!(
        "Interface {} has no usable {} address",
        name,
        version.as_str()
    )))
}

fn is_link_local(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(_) => false,
        IpAddr::V6(v6) => is_unicast_link_local(v6),
    }
}

fn is_unicast_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(target_family = "unix")]
mod os {
    use std::ffi::CStr;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use ddns_core::{Error, Result};

    use super::InterfaceAddress;

    pub(super) fn interface_addresses() -> Result<Vec<InterfaceAddress>> {
        let mut head: *mut libc::ifaddrs = std::ptr::null_mut();

        // SAFETY: on success getifaddrs stores a list head that stays valid
        // until freeifaddrs.
        if unsafe { libc::getifaddrs(&mut head) } != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let mut found = Vec::new();
        let mut current = head as *const libc::ifaddrs;

        while !current.is_null() {
            // SAFETY: non-null node of the list returned above.
            let ifaddr = unsafe { &*current };
            current = ifaddr.ifa_next as *const _;

            if ifaddr.ifa_addr.is_null() || ifaddr.ifa_name.is_null() {
                continue;
            }

            // SAFETY: interface names are NUL-terminated.
            let name = unsafe { CStr::from_ptr(ifaddr.ifa_name) }
                .to_string_lossy()
                .into_owned();

            // SAFETY: ifa_addr checked for null above.
            let family = i32::from(unsafe { (*ifaddr.ifa_addr).sa_family });
            let address = if family == libc::AF_INET {
                // SAFETY: sa_family says this is a sockaddr_in.
                let sin = unsafe { *(ifaddr.ifa_addr as *const libc::sockaddr_in) };
                IpAddr::V4(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)))
            } else if family == libc::AF_INET6 {
                // SAFETY: sa_family says this is a sockaddr_in6.
                let sin6 = unsafe { *(ifaddr.ifa_addr as *const libc::sockaddr_in6) };
                IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr))
            } else {
                continue;
            };

            let flags = ifaddr.ifa_flags;
            found.push(InterfaceAddress {
                interface: name,
                address,
                up: (flags & libc::IFF_UP as u32) != 0,
                loopback: (flags & libc::IFF_LOOPBACK as u32) != 0,
            });
        }

        // SAFETY: head came from getifaddrs and is freed exactly once.
        unsafe { libc::freeifaddrs(head) };

        Ok(found)
    }
}

#[cfg(not(target_family = "unix"))]
mod os {
    use ddns_core::{Error, Result};

    use super::InterfaceAddress;

    pub(super) fn interface_addresses() -> Result<Vec<InterfaceAddress>> {
        Err(Error::address_source(
            "Interface probing is only supported on Unix",
        ))
    }
}
