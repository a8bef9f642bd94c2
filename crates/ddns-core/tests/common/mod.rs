//! Test doubles and common utilities for contract tests
//!
//! Every double keeps its state behind `Arc`s, so clones share counters: a
//! test keeps one clone for assertions and hands another to the scheduler.

#![allow(dead_code)]

use async_trait::async_trait;
use ddns_core::address::{AddressResolver, AddressService, ServiceCatalog};
use ddns_core::config::{SchedulerConfig, StoreConfig};
use ddns_core::error::{Error, Result};
use ddns_core::task::{Credentials, IpVersion, NewTask, ProviderKind, RecordType, Task, TaskStatus};
use ddns_core::traits::{AddressProbe, DnsLookup, DnsProvider, DnsProviderFactory, RecordHandle};
use ddns_core::{MemoryTaskStore, ProviderRegistry, TaskScheduler, TaskStore};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PRIMARY_URL: &str = "https://primary.test/ip";
pub const BACKUP_URL: &str = "https://backup.test/ip";
pub const SECRET_ID: &str = "AKID-test";

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid IP literal")
}

/// What a scripted service answers
#[derive(Debug, Clone)]
pub enum Reply {
    Address(IpAddr),
    Fail,
    Slow(Duration, IpAddr),
}

/// Address probe answering from a per-URL script; unknown URLs fail
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    script: Arc<Mutex<HashMap<String, Reply>>>,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, reply: Reply) {
        self.script.lock().unwrap().insert(url.to_string(), reply);
    }

    pub fn answer(&self, url: &str, address: &str) {
        self.set(url, Reply::Address(ip(address)));
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressProbe for ScriptedProbe {
    fn supports(&self, _service: &AddressService) -> bool {
        true
    }

    async fn probe(&self, service: &AddressService) -> Result<IpAddr> {
        let url = service.url();
        self.calls.lock().unwrap().push(url.clone());
        let reply = self.script.lock().unwrap().get(&url).cloned();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match reply {
            Some(Reply::Address(addr)) => Ok(addr),
            Some(Reply::Slow(delay, addr)) => {
                tokio::time::sleep(delay).await;
                Ok(addr)
            }
            Some(Reply::Fail) | None => Err(Error::address_source(format!("{} unreachable", url))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn probe_name(&self) -> &'static str {
        "scripted"
    }
}

/// Live DNS answering a fixed value
#[derive(Clone, Default)]
pub struct FixedDnsLookup {
    answer: Arc<Mutex<Option<IpAddr>>>,
}

impl FixedDnsLookup {
    pub fn set(&self, answer: Option<IpAddr>) {
        *self.answer.lock().unwrap() = answer;
    }
}

#[async_trait]
impl DnsLookup for FixedDnsLookup {
    async fn lookup(&self, _domain: &str, version: IpVersion) -> Option<IpAddr> {
        let answer = *self.answer.lock().unwrap();
        answer.filter(|a| version.matches(a))
    }
}

type RecordKey = (String, String, RecordType);

/// In-memory DNS provider that counts calls
#[derive(Clone, Default)]
pub struct MockDnsProvider {
    records: Arc<Mutex<HashMap<RecordKey, RecordHandle>>>,
    written_values: Arc<Mutex<Vec<String>>>,
    failure: Arc<Mutex<Option<String>>>,
    find_count: Arc<AtomicUsize>,
    create_count: Arc<AtomicUsize>,
    update_count: Arc<AtomicUsize>,
    delete_count: Arc<AtomicUsize>,
    next_id: Arc<AtomicUsize>,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `message` (or succeed again with `None`)
    pub fn fail_with(&self, message: Option<&str>) {
        *self.failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn seed_record(&self, domain: &str, host: &str, value: &str) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.records.lock().unwrap().insert(
            (domain.to_string(), host.to_string(), RecordType::A),
            RecordHandle {
                id,
                domain: domain.to_string(),
                host: host.to_string(),
                record_type: RecordType::A,
                value: Some(value.to_string()),
            },
        );
    }

    pub fn record_value(&self, domain: &str, host: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(&(domain.to_string(), host.to_string(), RecordType::A))
            .and_then(|r| r.value.clone())
    }

    pub fn written_values(&self) -> Vec<String> {
        self.written_values.lock().unwrap().clone()
    }

    pub fn find_count(&self) -> usize {
        self.find_count.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_count.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.delete_count.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.find_count() + self.create_count() + self.update_count() + self.delete_count()
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(Error::provider_api("mock", message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn find_record(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
    ) -> Result<Option<RecordHandle>> {
        self.find_count.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(domain.to_string(), host.to_string(), record_type))
            .cloned())
    }

    async fn create_record(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
        value: &str,
        _ttl: u32,
    ) -> Result<()> {
        self.create_count.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.records.lock().unwrap().insert(
            (domain.to_string(), host.to_string(), record_type),
            RecordHandle {
                id,
                domain: domain.to_string(),
                host: host.to_string(),
                record_type,
                value: Some(value.to_string()),
            },
        );
        self.written_values.lock().unwrap().push(value.to_string());
        Ok(())
    }

    async fn update_record(
        &self,
        record: &RecordHandle,
        host: &str,
        record_type: RecordType,
        value: &str,
        _ttl: u32,
    ) -> Result<()> {
        self.update_count.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let mut records = self.records.lock().unwrap();
        let existing = records
            .get_mut(&(record.domain.clone(), host.to_string(), record_type))
            .ok_or_else(|| Error::provider_api("mock", "record vanished"))?;
        existing.value = Some(value.to_string());
        self.written_values.lock().unwrap().push(value.to_string());
        Ok(())
    }

    async fn delete_all_records(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
    ) -> Result<usize> {
        self.delete_count.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let removed = self
            .records
            .lock()
            .unwrap()
            .remove(&(domain.to_string(), host.to_string(), record_type));
        Ok(usize::from(removed.is_some()))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Factory handing out clones that share the mock's counters
pub struct MockProviderFactory(pub MockDnsProvider);

impl DnsProviderFactory for MockProviderFactory {
    fn create(&self, _credentials: &Credentials) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(self.0.clone()))
    }
}

/// Scheduler wired to test doubles
pub struct Harness {
    pub scheduler: TaskScheduler,
    pub probe: ScriptedProbe,
    pub dns: FixedDnsLookup,
    pub provider: MockDnsProvider,
}

pub fn test_catalog() -> ServiceCatalog {
    ServiceCatalog::from_services(vec![
        AddressService::http("primary", PRIMARY_URL, IpVersion::V4),
        AddressService::http("backup", BACKUP_URL, IpVersion::V4),
    ])
}

pub fn test_resolver(probe: &ScriptedProbe) -> AddressResolver {
    AddressResolver::new(test_catalog(), Duration::from_secs(5), Duration::from_secs(10))
        .with_probe(Arc::new(probe.clone()))
}

pub fn registry_with(provider: &MockDnsProvider) -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    registry.register_provider(ProviderKind::Tencent, Box::new(MockProviderFactory(provider.clone())));
    registry.register_provider(ProviderKind::Aliyun, Box::new(MockProviderFactory(provider.clone())));
    Arc::new(registry)
}

pub fn harness_with_store(store: Arc<dyn TaskStore>) -> Harness {
    let probe = ScriptedProbe::new();
    let dns = FixedDnsLookup::default();
    let provider = MockDnsProvider::new();

    let config = SchedulerConfig {
        store: StoreConfig::Memory,
        ..Default::default()
    };

    let scheduler = TaskScheduler::new(
        &config,
        registry_with(&provider),
        store,
        test_resolver(&probe),
        Arc::new(dns.clone()),
    );

    Harness {
        scheduler,
        probe,
        dns,
        provider,
    }
}

pub fn harness() -> Harness {
    harness_with_store(Arc::new(MemoryTaskStore::new()))
}

pub fn new_task(host: &str, interval_secs: u64) -> NewTask {
    NewTask {
        provider: ProviderKind::Tencent,
        credentials: Credentials::new(SECRET_ID, "test-secret-key"),
        domain: "example.com".to_string(),
        host: host.to_string(),
        record_type: RecordType::A,
        service_url: PRIMARY_URL.to_string(),
        service_name: "primary".to_string(),
        interval_secs,
    }
}

/// A stored task as it would come back from disk
pub fn stored_task(id: &str, host: &str, last_ip: Option<&str>, enabled: bool) -> Task {
    Task {
        id: id.to_string(),
        provider: ProviderKind::Tencent,
        credentials: Credentials::new(SECRET_ID, "test-secret-key"),
        domain: "example.com".to_string(),
        host: host.to_string(),
        full_domain: String::new(),
        record_type: RecordType::A,
        service_url: PRIMARY_URL.to_string(),
        service_name: "primary".to_string(),
        interval_secs: 3600,
        enabled,
        last_ip: last_ip.map(ip),
        last_update: None,
        status: if enabled {
            TaskStatus::Running
        } else {
            TaskStatus::Stopped
        },
        last_error: None,
    }
}
