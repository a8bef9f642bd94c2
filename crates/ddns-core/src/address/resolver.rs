//! Address resolver with fallback across services

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use super::{AddressService, ServiceCatalog};
use crate::task::IpVersion;
use crate::traits::AddressProbe;
use crate::{Error, Result};

/// Address obtained by [`AddressResolver::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub address: IpAddr,
    /// Service that produced the address
    pub service: AddressService,
    /// Why the preferred service was abandoned, when a fallback answered
    pub preferred_error: Option<String>,
}

impl Resolved {
    pub fn fell_back(&self) -> bool {
        self.preferred_error.is_some()
    }
}

/// Outcome for one service in [`AddressResolver::fetch_all`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReading {
    pub service: AddressService,
    pub address: Option<IpAddr>,
    pub error: Option<String>,
}

impl ServiceReading {
    fn new(service: AddressService, result: Result<IpAddr>) -> Self {
        match result {
            Ok(address) => Self {
                service,
                address: Some(address),
                error: None,
            },
            Err(e) => Self {
                service,
                address: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Queries address services through the registered probes
///
/// Cloning is cheap; clones share the catalog and the probes.
#[derive(Clone)]
pub struct AddressResolver {
    catalog: Arc<ServiceCatalog>,
    probes: Vec<Arc<dyn AddressProbe>>,
    request_timeout: Duration,
    batch_deadline: Duration,
}

impl AddressResolver {
    pub fn new(catalog: ServiceCatalog, request_timeout: Duration, batch_deadline: Duration) -> Self {
        Self {
            catalog: Arc::new(catalog),
            probes: Vec::new(),
            request_timeout,
            batch_deadline,
        }
    }

    /// Add a probe; earlier probes win when several support a service
    pub fn with_probe(mut self, probe: Arc<dyn AddressProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// Descriptor for a task's service selection
    ///
    /// Catalog entries are preferred so that fallback can skip them by identity.
    pub fn service_for(&self, url: &str, name: &str, version: IpVersion) -> AddressService {
        self.catalog
            .find(url, version)
            .cloned()
            .unwrap_or_else(|| AddressService::from_url(url, name, version))
    }

    /// Current address, trying `preferred` first and then every catalog
    /// service of the same IP version
    ///
    /// Returns `None` when no service produced an address.
    pub async fn resolve(&self, preferred: &AddressService) -> Option<Resolved> {
        let preferred_error = match self.probe(preferred).await {
            Ok(address) => {
                return Some(Resolved {
                    address,
                    service: preferred.clone(),
                    preferred_error: None,
                });
            }
            Err(e) => e.to_string(),
        };

        tracing::warn!(
            service = %preferred,
            error = %preferred_error,
            "Preferred address service failed, trying fallbacks"
        );

        let preferred_url = preferred.url();
        for service in self
            .catalog
            .for_version(preferred.version)
            .filter(|s| s.url() != preferred_url)
        {
            match self.probe(service).await {
                Ok(address) => {
                    tracing::info!(service = %service, %address, "Fallback address service answered");
                    return Some(Resolved {
                        address,
                        service: service.clone(),
                        preferred_error: Some(preferred_error),
                    });
                }
                Err(e) => {
                    tracing::debug!(service = %service, error = %e, "Fallback address service failed");
                }
            }
        }

        tracing::warn!(version = preferred.version.as_str(), "All address services failed");
        None
    }

    /// Query every catalog service concurrently
    ///
    /// Services that fail are reported with their error. Services still
    /// running when the collection deadline passes are dropped from the
    /// result. Readings come back in catalog order.
    pub async fn fetch_all(&self, version: Option<IpVersion>) -> Vec<ServiceReading> {
        let mut set = JoinSet::new();
        for (index, service) in self
            .catalog
            .services()
            .iter()
            .filter(|s| version.is_none_or(|v| s.version == v))
            .cloned()
            .enumerate()
        {
            let resolver = self.clone();
            set.spawn(async move {
                let result = resolver.probe(&service).await;
                (index, ServiceReading::new(service, result))
            });
        }

        let deadline = Instant::now() + self.batch_deadline;
        let mut readings = Vec::with_capacity(set.len());
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(reading))) => readings.push(reading),
                Ok(Some(Err(e))) => tracing::warn!("Address probe task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "{} address services missed the {:?} deadline and were dropped",
                        set.len(),
                        self.batch_deadline
                    );
                    set.abort_all();
                    break;
                }
            }
        }

        readings.sort_by_key(|(index, _)| *index);
        readings.into_iter().map(|(_, reading)| reading).collect()
    }

    async fn probe(&self, service: &AddressService) -> Result<IpAddr> {
        let probe = self
            .probes
            .iter()
            .find(|p| p.supports(service))
            .ok_or_else(|| Error::address_source(format!("No probe can query {}", service)))?;

        let address = tokio::time::timeout(self.request_timeout, probe.probe(service))
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "{} did not answer within {:?}",
                    service, self.request_timeout
                ))
            })??;

        if !service.version.matches(&address) {
            return Err(Error::address_source(format!(
                "{} returned {} but {} was requested",
                service,
                address,
                service.version.as_str()
            )));
        }

        tracing::trace!(probe = probe.probe_name(), service = %service, %address, "Probe answered");
        Ok(address)
    }
}

impl std::fmt::Debug for AddressResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressResolver")
            .field("services", &self.catalog.len())
            .field(
                "probes",
                &self.probes.iter().map(|p| p.probe_name()).collect::<Vec<_>>(),
            )
            .field("request_timeout", &self.request_timeout)
            .field("batch_deadline", &self.batch_deadline)
            .finish()
    }
}
