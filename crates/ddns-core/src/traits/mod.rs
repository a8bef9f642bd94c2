//! Core traits for the DDNS scheduler
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DnsProvider`]: Find, create, update and delete records via provider APIs
//! - [`AddressProbe`]: Query one address service
//! - [`DnsLookup`]: Resolve the live DNS answer for a domain
//! - [`TaskStore`]: Durable task persistence

pub mod address_probe;
pub mod dns_lookup;
pub mod dns_provider;
pub mod task_store;

pub use address_probe::AddressProbe;
pub use dns_lookup::{DnsLookup, SystemDnsLookup};
pub use dns_provider::{DnsProvider, DnsProviderFactory, RecordHandle};
pub use task_store::TaskStore;
