//! Reconciliation engine
//!
//! The [`Reconciler`] runs one resolve-compare-write cycle for one task:
//! - Resolving the current address (with fallback) via [`AddressResolver`]
//! - Resolving the live DNS answer for the task's full domain
//! - Deciding whether a write is needed
//! - Writing through the task's [`DnsProvider`]
//! - Recording the outcome in the [`OperationLog`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐      ┌──────────────┐
//! │ AddressResolver │      │  DnsLookup   │
//! │ (current addr)  │      │ (live answer)│
//! └─────────────────┘      └──────────────┘
//!          │                      │
//!          └──────────┬───────────┘
//!                     ▼
//!             ┌──────────────┐
//!             │  Reconciler  │──── one entry per outcome ───► OperationLog
//!             └──────────────┘
//!                     │ write needed
//!                     ▼
//!             ┌──────────────┐
//!             │ DnsProvider  │ find_record → update_record | create_record
//!             └──────────────┘
//! ```
//!
//! ## Decision Policy
//!
//! 1. No current address ⇒ `AllServicesUnavailable`, nothing is written
//! 2. `local_changed = current != task.last_ip`
//! 3. `drift = live answer exists && live answer != current`
//! 4. Neither ⇒ "unchanged", zero provider calls
//! 5. Drift without a local change ⇒ warning entry, then write
//! 6. Write: update the existing record, or create one
//!
//! The reconciler never mutates the task; the scheduler applies the outcome.

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::address::AddressResolver;
use crate::error::{Error, Result};
use crate::oplog::OperationLog;
use crate::task::Task;
use crate::traits::{DnsLookup, DnsProvider};

/// Outcome of a successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Whether a DNS write happened
    pub updated: bool,
    /// Current address of the host
    pub address: IpAddr,
    /// Live DNS answer, when it disagreed with the current address
    pub drift: Option<IpAddr>,
    /// Name of the address service that answered
    pub service: String,
    pub message: String,
}

/// Runs resolve-compare-write cycles for tasks
pub struct Reconciler {
    resolver: AddressResolver,
    dns: Arc<dyn DnsLookup>,
    log: Arc<OperationLog>,
    provider_deadline: Duration,
    record_ttl: u32,

    /// Serializes find/write sequences per (provider, full domain, type)
    record_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(
        resolver: AddressResolver,
        dns: Arc<dyn DnsLookup>,
        log: Arc<OperationLog>,
        provider_deadline: Duration,
        record_ttl: u32,
    ) -> Self {
        Self {
            resolver,
            dns,
            log,
            provider_deadline,
            record_ttl,
            record_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    /// Run one reconciliation of `task` through `provider`
    ///
    /// Appends exactly one outcome entry to the operation log: `info` when
    /// nothing changed, `success` after a write, `error` on failure.
    pub async fn reconcile(&self, task: &Task, provider: &dyn DnsProvider) -> Result<Reconciliation> {
        match self.decide_and_write(task, provider).await {
            Ok(outcome) => {
                if outcome.updated {
                    self.log.success(format!(
                        "[{}] {} updated: {}",
                        task.id, task.full_domain, outcome.message
                    ));
                } else {
                    self.log.info(format!(
                        "[{}] {} unchanged ({})",
                        task.id, task.full_domain, outcome.address
                    ));
                }
                Ok(outcome)
            }
            Err(e) => {
                self.log
                    .error(format!("[{}] {} failed: {}", task.id, task.full_domain, e));
                Err(e)
            }
        }
    }

    /// Remove every record the task manages at the provider
    pub async fn delete_remote(&self, task: &Task, provider: &dyn DnsProvider) -> Result<usize> {
        let lock = self.record_lock(task, provider);
        let _guard = lock.lock().await;

        self.bounded(
            provider,
            "delete",
            provider.delete_all_records(&task.domain, &task.host, task.record_type),
        )
        .await
    }

    async fn decide_and_write(
        &self,
        task: &Task,
        provider: &dyn DnsProvider,
    ) -> Result<Reconciliation> {
        let version = task.record_type.ip_version();
        let preferred = self
            .resolver
            .service_for(&task.service_url, &task.service_name, version);

        let resolved = self
            .resolver
            .resolve(&preferred)
            .await
            .ok_or(Error::AllServicesUnavailable)?;

        if let Some(reason) = &resolved.preferred_error {
            self.log.warn(format!(
                "[{}] {} failed ({}), used {} instead",
                task.id, preferred.name, reason, resolved.service.name
            ));
        }

        let current = resolved.address;
        let live = self.dns.lookup(&task.full_domain, version).await;
        let local_changed = task.last_ip != Some(current);
        let drift = live.filter(|answer| *answer != current);

        debug!(
            task_id = %task.id,
            %current,
            last = ?task.last_ip,
            live = ?live,
            "Reconciling"
        );

        if !local_changed && drift.is_none() {
            return Ok(Reconciliation {
                updated: false,
                address: current,
                drift: None,
                service: resolved.service.name,
                message: "unchanged".to_string(),
            });
        }

        if let (Some(answer), false) = (drift, local_changed) {
            self.log.warn(format!(
                "[{}] {} drift: DNS answers {} but the current address is {}",
                task.id, task.full_domain, answer, current
            ));
        }

        self.write(task, provider, current).await?;

        let message = match task.last_ip {
            Some(previous) if previous != current => format!("{} -> {}", previous, current),
            _ => current.to_string(),
        };
        info!(task_id = %task.id, domain = %task.full_domain, %current, "DNS record written");

        Ok(Reconciliation {
            updated: true,
            address: current,
            drift,
            service: resolved.service.name,
            message,
        })
    }

    async fn write(&self, task: &Task, provider: &dyn DnsProvider, address: IpAddr) -> Result<()> {
        let lock = self.record_lock(task, provider);
        let _guard = lock.lock().await;

        let value = address.to_string();
        let existing = self
            .bounded(
                provider,
                "find",
                provider.find_record(&task.domain, &task.host, task.record_type),
            )
            .await?;

        match existing {
            Some(record) => {
                debug!(task_id = %task.id, record_id = %record.id, "Updating existing record");
                self.bounded(
                    provider,
                    "update",
                    provider.update_record(&record, &task.host, task.record_type, &value, self.record_ttl),
                )
                .await
            }
            None => {
                debug!(task_id = %task.id, "No existing record, creating");
                self.bounded(
                    provider,
                    "create",
                    provider.create_record(
                        &task.domain,
                        &task.host,
                        task.record_type,
                        &value,
                        self.record_ttl,
                    ),
                )
                .await
            }
        }
    }

    async fn bounded<T>(
        &self,
        provider: &dyn DnsProvider,
        call: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.provider_deadline, fut)
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "{} {} call exceeded {:?}",
                    provider.provider_name(),
                    call,
                    self.provider_deadline
                ))
            })?
    }

    fn record_lock(&self, task: &Task, provider: &dyn DnsProvider) -> Arc<tokio::sync::Mutex<()>> {
        let key = format!(
            "{}/{}/{}",
            provider.provider_name(),
            task.full_domain,
            task.record_type
        );
        let mut locks = self.record_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key).or_default().clone()
    }
}
