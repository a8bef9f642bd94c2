//! Address discovery
//!
//! ```text
//!   task.service_url ──► AddressResolver::resolve
//!                              │
//!                 preferred service (one attempt)
//!                              │ failure
//!                              ▼
//!                 ServiceCatalog services of the same IP version,
//!                 in catalog order, preferred one skipped
//!                              │
//!                              ▼
//!                 AddressProbe (HTTP / interface) ──► extract
//! ```
//!
//! The catalog is built once at startup from the built-in services plus any
//! custom HTTP services and interface monitors, and is immutable afterwards.

pub mod extract;
pub mod resolver;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::task::IpVersion;
use crate::{Error, Result};

pub use extract::{extract_address, extract_ipv4, extract_ipv6};
pub use resolver::{AddressResolver, Resolved, ServiceReading};

/// URL scheme naming a local network interface as an address service
pub const INTERFACE_SCHEME: &str = "iface://";

/// Display name given to services read from the custom services file
pub const CUSTOM_SERVICE_NAME: &str = "custom";

const BUILTIN_V4: &[(&str, &str)] = &[
    ("Amazon", "http://checkip.amazonaws.com"),
    ("icanhazip", "https://ipv4.icanhazip.com"),
    ("ifconfig.me", "https://ifconfig.me/ip"),
    ("ipinfo.io", "https://ipinfo.io/ip"),
    ("ident.me", "https://v4.ident.me"),
    ("wtfismyip", "https://wtfismyip.com/text"),
    ("ipip.net", "https://myip.ipip.net/ip"),
];

const BUILTIN_V6: &[(&str, &str)] = &[
    ("icanhazip-v6", "https://ipv6.icanhazip.com"),
    ("ident.me-v6", "https://v6.ident.me"),
    ("ifconfig.co-v6", "https://ifconfig.co/ip"),
    ("ip.sb-v6", "https://api-ipv6.ip.sb/ip"),
    ("ipv6-test", "https://v6.ipv6-test.com/api/myip.php"),
];

/// How an address service is reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceKind {
    /// "What is my IP" web service
    Http { url: String },
    /// Address assigned to a local network interface
    Interface { name: String },
}

/// Where a service descriptor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOrigin {
    BuiltIn,
    Custom,
}

/// Immutable descriptor of one address service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressService {
    pub name: String,
    pub kind: ServiceKind,
    pub version: IpVersion,
    pub origin: ServiceOrigin,
}

impl AddressService {
    pub fn http(name: impl Into<String>, url: impl Into<String>, version: IpVersion) -> Self {
        Self {
            name: name.into(),
            kind: ServiceKind::Http { url: url.into() },
            version,
            origin: ServiceOrigin::Custom,
        }
    }

    pub fn interface(name: impl Into<String>, version: IpVersion) -> Self {
        let name = name.into();
        Self {
            name: format!("{} ({})", name, version.as_str()),
            kind: ServiceKind::Interface { name },
            version,
            origin: ServiceOrigin::Custom,
        }
    }

    /// Build a descriptor from a task's service selection
    ///
    /// `iface://<name>` selects a local interface, anything else is an HTTP URL.
    pub fn from_url(url: &str, name: &str, version: IpVersion) -> Self {
        match url.strip_prefix(INTERFACE_SCHEME) {
            Some(iface) => Self {
                name: name.to_string(),
                kind: ServiceKind::Interface {
                    name: iface.to_string(),
                },
                version,
                origin: ServiceOrigin::Custom,
            },
            None => Self::http(name, url, version),
        }
    }

    /// URL identifying this service
    pub fn url(&self) -> String {
        match &self.kind {
            ServiceKind::Http { url } => url.clone(),
            ServiceKind::Interface { name } => format!("{}{}", INTERFACE_SCHEME, name),
        }
    }

    fn builtin(name: &str, url: &str, version: IpVersion) -> Self {
        Self {
            origin: ServiceOrigin::BuiltIn,
            ..Self::http(name, url, version)
        }
    }
}

impl fmt::Display for AddressService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.url())
    }
}

/// Ordered, immutable set of address services
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    services: Vec<AddressService>,
}

impl ServiceCatalog {
    /// Catalog holding only the built-in services
    pub fn builtin() -> Self {
        let v4 = BUILTIN_V4
            .iter()
            .map(|(name, url)| AddressService::builtin(name, url, IpVersion::V4));
        let v6 = BUILTIN_V6
            .iter()
            .map(|(name, url)| AddressService::builtin(name, url, IpVersion::V6));
        Self {
            services: v4.chain(v6).collect(),
        }
    }

    /// Catalog with exactly `services`, in order
    pub fn from_services(services: Vec<AddressService>) -> Self {
        Self { services }
    }

    /// Append extra services after the existing ones
    pub fn with_services(mut self, extra: impl IntoIterator<Item = AddressService>) -> Self {
        self.services.extend(extra);
        self
    }

    /// Built-in catalog extended from the optional custom services and
    /// interface monitor files
    pub fn load(
        custom_services_file: Option<&Path>,
        interface_monitors_file: Option<&Path>,
    ) -> Result<Self> {
        let mut catalog = Self::builtin();

        if let Some(path) = custom_services_file {
            let content = read_optional(path)?;
            let custom = parse_custom_services(&content);
            tracing::info!("Loaded {} custom address services", custom.len());
            catalog = catalog.with_services(custom);
        }

        if let Some(path) = interface_monitors_file {
            let content = read_optional(path)?;
            let monitors = parse_interface_monitors(&content)?;
            tracing::info!("Loaded {} interface monitors", monitors.len());
            catalog = catalog.with_services(monitors);
        }

        Ok(catalog)
    }

    pub fn services(&self) -> &[AddressService] {
        &self.services
    }

    /// Services of one IP version, in catalog order
    pub fn for_version(&self, version: IpVersion) -> impl Iterator<Item = &AddressService> {
        self.services.iter().filter(move |s| s.version == version)
    }

    /// Service with the given URL and IP version
    pub fn find(&self, url: &str, version: IpVersion) -> Option<&AddressService> {
        self.services
            .iter()
            .find(|s| s.version == version && s.url() == url)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Parse a custom services file: one URL per line, `#` comments
pub fn parse_custom_services(content: &str) -> Vec<AddressService> {
    significant_lines(content)
        .map(|url| AddressService::http(CUSTOM_SERVICE_NAME, url, IpVersion::V4))
        .collect()
}

/// Parse an interface monitors file: one `iface|ipv4` or `iface|ipv6` per line
pub fn parse_interface_monitors(content: &str) -> Result<Vec<AddressService>> {
    significant_lines(content)
        .map(|line| {
            let (iface, version) = line
                .split_once('|')
                .ok_or_else(|| Error::config(format!("Malformed interface monitor: {}", line)))?;
            let version = match version.trim().to_ascii_lowercase().as_str() {
                "ipv4" => IpVersion::V4,
                "ipv6" => IpVersion::V6,
                other => {
                    return Err(Error::config(format!(
                        "Unknown IP version '{}' for interface {}",
                        other, iface
                    )));
                }
            };
            Ok(AddressService::interface(iface.trim(), version))
        })
        .collect()
}

fn significant_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

fn read_optional(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("{} does not exist, nothing to load", path.display());
            Ok(String::new())
        }
        Err(e) => Err(Error::config(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}
