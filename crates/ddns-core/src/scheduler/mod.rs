//! Task registry and scheduler
//!
//! [`TaskScheduler`] owns every [`Task`], the recurring timer of each enabled
//! task, and the durable task store. It drives the [`Reconciler`] on every
//! tick and applies outcomes back onto the task records.
//!
//! ## Task Lifecycle
//!
//! ```text
//!            add
//!             │
//!             ▼
//!        ┌─────────┐  start   ┌─────────┐  execution fails  ┌─────────┐
//!        │ stopped │ ───────► │ running │ ────────────────► │  error  │
//!        └─────────┘ ◄─────── └─────────┘ ◄──────────────── └─────────┘
//!             ▲         stop               execution succeeds    │
//!             └──────────────────────────────────────────────────┘
//!                                   stop
//! ```
//!
//! ## Concurrency
//!
//! - At most one reconciliation per task runs at a time. A scheduled tick
//!   that finds the task busy is skipped; `start` and `execute_now` wait.
//! - At most `worker_slots` reconciliations run across all tasks.
//! - Every timer is its own tokio task, so one slow task never delays another.
//! - Stopping a task cancels future ticks only; a run in progress completes
//!   and its outcome is recorded, but the task stays `stopped`.
//! - Store rewrites are serialized and always write a full snapshot.

mod timer;

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::address::AddressResolver;
use crate::config::SchedulerConfig;
use crate::engine::{Reconciler, Reconciliation};
use crate::error::{Error, Result};
use crate::oplog::{LogEntry, OperationLog};
use crate::registry::ProviderRegistry;
use crate::task::{MAX_INTERVAL_SECS, NewTask, Task, TaskStatus, validate_schedule};
use crate::traits::{DnsLookup, DnsProvider, TaskStore};

use timer::TimerHandle;

/// Registry-owned state of one task
struct TaskEntry {
    task: Task,
    /// Adapter built once from the task's provider and credentials
    provider: Arc<dyn DnsProvider>,
    /// Held for the duration of every reconciliation of this task
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl TaskEntry {
    fn new(task: Task, provider: Arc<dyn DnsProvider>) -> Self {
        Self {
            task,
            provider,
            gate: Arc::default(),
        }
    }
}

pub(crate) struct Inner {
    tasks: RwLock<IndexMap<String, TaskEntry>>,
    timers: Mutex<HashMap<String, TimerHandle>>,
    reconciler: Reconciler,
    providers: Arc<ProviderRegistry>,
    store: Arc<dyn TaskStore>,
    persist_lock: tokio::sync::Mutex<()>,
    workers: Semaphore,
    log: Arc<OperationLog>,
    shutdown_timeout: Duration,
}

/// Owns tasks, their timers and their persistence
///
/// Cloning is cheap; clones drive the same registry.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    pub fn new(
        config: &SchedulerConfig,
        providers: Arc<ProviderRegistry>,
        store: Arc<dyn TaskStore>,
        resolver: AddressResolver,
        dns: Arc<dyn DnsLookup>,
    ) -> Self {
        let log = Arc::new(OperationLog::new(config.log_capacity));
        let reconciler = Reconciler::new(
            resolver,
            dns,
            log.clone(),
            config.provider_deadline(),
            config.record_ttl,
        );

        Self {
            inner: Arc::new(Inner {
                tasks: RwLock::new(IndexMap::new()),
                timers: Mutex::new(HashMap::new()),
                reconciler,
                providers,
                store,
                persist_lock: tokio::sync::Mutex::new(()),
                workers: Semaphore::new(config.worker_slots.max(1)),
                log,
                shutdown_timeout: config.shutdown_timeout(),
            }),
        }
    }

    /// Load the stored tasks and auto-start every enabled one
    ///
    /// Fails without touching the registry if any stored task cannot get a
    /// provider adapter. Failures of the initial runs are recorded on the
    /// tasks and do not fail initialization.
    pub async fn init(&self) -> Result<usize> {
        let stored = self.inner.store.load().await?;

        let mut entries = Vec::with_capacity(stored.len());
        for mut task in stored {
            task.refresh_derived();
            if !task.enabled {
                task.status = TaskStatus::Stopped;
            }
            let provider = self
                .inner
                .providers
                .create_provider(task.provider, &task.credentials)
                .map_err(|e| {
                    Error::config(format!("Task {} ({}): {}", task.id, task.full_domain, e))
                })?;
            entries.push(TaskEntry::new(task, provider));
        }

        let enabled: Vec<String> = entries
            .iter()
            .filter(|e| e.task.enabled)
            .map(|e| e.task.id.clone())
            .collect();
        let loaded = entries.len();

        {
            let mut tasks = self.inner.tasks_mut();
            for entry in entries {
                tasks.insert(entry.task.id.clone(), entry);
            }
        }

        info!("Loaded {} tasks, auto-starting {}", loaded, enabled.len());

        let mut starts = JoinSet::new();
        for id in enabled {
            let scheduler = self.clone();
            starts.spawn(async move {
                let result = scheduler.start(&id).await;
                (id, result)
            });
        }
        while let Some(joined) = starts.join_next().await {
            match joined {
                Ok((id, Err(e))) => warn!(task_id = %id, "Auto-start failed: {}", e),
                Ok(_) => {}
                Err(e) => error!("Auto-start task panicked: {}", e),
            }
        }

        Ok(loaded)
    }

    /// Create a stopped, disabled task and persist it
    ///
    /// The task is only kept if the snapshot containing it was saved.
    pub async fn add(&self, new_task: NewTask) -> Result<Task> {
        new_task.validate()?;

        let provider = self
            .inner
            .providers
            .create_provider(new_task.provider, &new_task.credentials)
            .map_err(|e| match e {
                Error::Config(msg) => Error::validation(msg),
                other => other,
            })?;

        let task = new_task.into_task();
        self.inner
            .tasks_mut()
            .insert(task.id.clone(), TaskEntry::new(task.clone(), provider));

        if let Err(e) = self.inner.persist().await {
            self.inner.tasks_mut().shift_remove(&task.id);
            return Err(e);
        }

        self.inner.log.info(format!(
            "[{}] task added: {} via {}",
            task.id, task.full_domain, task.provider
        ));
        Ok(task)
    }

    /// Change the schedule of a task, restarting it if it was running
    pub async fn update(
        &self,
        id: &str,
        interval_secs: u64,
        service_url: &str,
        service_name: &str,
    ) -> Result<Task> {
        let was_enabled = self.get(id)?.enabled;
        validate_schedule(interval_secs, service_url)?;

        if was_enabled {
            self.stop(id).await?;
        }

        self.inner.with_task_mut(id, |task| {
            task.interval_secs = interval_secs;
            task.service_url = service_url.trim().to_string();
            task.service_name = service_name.to_string();
        })?;
        self.inner.log.info(format!(
            "[{}] task updated: every {}s via {}",
            id, interval_secs, service_name
        ));

        if was_enabled {
            self.start(id).await
        } else {
            self.inner.persist().await?;
            self.get(id)
        }
    }

    /// Enable a task: run it once right away, then every interval
    ///
    /// A failed first run is recorded on the task; the timer is armed anyway.
    pub async fn start(&self, id: &str) -> Result<Task> {
        self.inner.cancel_timer(id);
        self.inner.with_task_mut(id, Task::mark_started)?;

        match self.inner.execute(id).await {
            Ok(_) => {}
            Err(e @ Error::NotFound(_)) => return Err(e),
            Err(e) => warn!(task_id = %id, "Initial run failed, arming timer anyway: {}", e),
        }

        let task = self.get(id)?;
        // A concurrent stop wins over this start
        if task.enabled {
            self.inner.arm_timer(id, Duration::from_secs(task.interval_secs));
            self.inner.log.info(format!(
                "[{}] task started: {} every {}s",
                id, task.full_domain, task.interval_secs
            ));
        }

        self.inner.persist().await?;
        Ok(task)
    }

    /// Disable a task and cancel its timer
    pub async fn stop(&self, id: &str) -> Result<Task> {
        let task = self.inner.with_task_mut(id, |task| {
            task.mark_stopped();
            task.clone()
        })?;

        if self.inner.cancel_timer(id) {
            self.inner
                .log
                .info(format!("[{}] task stopped: {}", id, task.full_domain));
        }

        self.inner.persist().await?;
        Ok(task)
    }

    /// Stop a task, remove its remote record (best effort) and forget it
    pub async fn delete(&self, id: &str) -> Result<Task> {
        self.stop(id).await?;

        let (task, provider, gate) = self.inner.entry_parts(id)?;
        let _running = gate.lock().await;

        match self.inner.reconciler.delete_remote(&task, provider.as_ref()).await {
            Ok(removed) => {
                debug!(task_id = %id, removed, "Remote records deleted");
            }
            Err(e) => {
                self.inner.log.warn(format!(
                    "[{}] could not delete DNS record {}: {}",
                    id, task.full_domain, e
                ));
            }
        }

        let removed = self
            .inner
            .tasks_mut()
            .shift_remove(id)
            .map(|entry| entry.task)
            .ok_or_else(|| Error::not_found(id))?;

        self.inner
            .log
            .info(format!("[{}] task deleted: {}", id, removed.full_domain));
        self.inner.persist().await?;
        Ok(removed)
    }

    /// Reconcile a task right now, outside its timer
    ///
    /// Waits for a run already in progress on the same task.
    pub async fn execute_now(&self, id: &str) -> Result<Reconciliation> {
        self.inner.execute(id).await
    }

    pub fn get(&self, id: &str) -> Result<Task> {
        self.inner
            .tasks()
            .get(id)
            .map(|entry| entry.task.clone())
            .ok_or_else(|| Error::not_found(id))
    }

    /// Snapshot of every task, in creation order
    pub fn list_all(&self) -> Vec<Task> {
        self.inner
            .tasks()
            .values()
            .map(|entry| entry.task.clone())
            .collect()
    }

    /// Snapshot of the tasks using credentials `secret_id`
    pub fn list_by_account(&self, secret_id: &str) -> Vec<Task> {
        self.inner
            .tasks()
            .values()
            .filter(|entry| entry.task.credentials.secret_id == secret_id)
            .map(|entry| entry.task.clone())
            .collect()
    }

    /// Whether a timer is currently armed for `id`
    pub fn is_scheduled(&self, id: &str) -> bool {
        self.inner.timers().contains_key(id)
    }

    /// Operation log entries from `from` on
    pub fn logs(&self, from: usize) -> Vec<LogEntry> {
        self.inner.log.entries_from(from)
    }

    pub fn log_count(&self) -> usize {
        self.inner.log.len()
    }

    pub fn operation_log(&self) -> &Arc<OperationLog> {
        &self.inner.log
    }

    pub fn address_resolver(&self) -> &AddressResolver {
        self.inner.reconciler.resolver()
    }

    /// Cancel every timer, wait for the timer loops, and persist
    ///
    /// Enabled flags are kept, so the same tasks auto-start on the next `init`.
    pub async fn shutdown(&self) -> Result<()> {
        let timers: Vec<TimerHandle> = self.inner.timers().drain().map(|(_, t)| t).collect();
        info!("Shutting down scheduler, cancelling {} timers", timers.len());

        let handles: Vec<_> = timers.into_iter().map(TimerHandle::cancel).collect();
        let drained = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("Timer loop ended abnormally: {}", e);
                }
            }
        };
        if tokio::time::timeout(self.inner.shutdown_timeout, drained)
            .await
            .is_err()
        {
            warn!(
                "Timer loops still busy after {:?}, continuing shutdown",
                self.inner.shutdown_timeout
            );
        }

        self.inner.workers.close();
        self.inner.persist().await
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("tasks", &self.inner.tasks().len())
            .field("timers", &self.inner.timers().len())
            .finish()
    }
}

impl Inner {
    fn tasks(&self) -> RwLockReadGuard<'_, IndexMap<String, TaskEntry>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks_mut(&self) -> RwLockWriteGuard<'_, IndexMap<String, TaskEntry>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, TimerHandle>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_task_mut<T>(&self, id: &str, f: impl FnOnce(&mut Task) -> T) -> Result<T> {
        let mut tasks = self.tasks_mut();
        let entry = tasks.get_mut(id).ok_or_else(|| Error::not_found(id))?;
        Ok(f(&mut entry.task))
    }

    fn entry_parts(
        &self,
        id: &str,
    ) -> Result<(Task, Arc<dyn DnsProvider>, Arc<tokio::sync::Mutex<()>>)> {
        let tasks = self.tasks();
        let entry = tasks.get(id).ok_or_else(|| Error::not_found(id))?;
        Ok((entry.task.clone(), entry.provider.clone(), entry.gate.clone()))
    }

    fn arm_timer(self: &Arc<Self>, id: &str, every: Duration) {
        // Stored tasks skip validation; keep the period within what Instant can represent
        let every = every.min(Duration::from_secs(MAX_INTERVAL_SECS));
        let timer = TimerHandle::spawn(Arc::downgrade(self), id.to_string(), every);
        if let Some(previous) = self.timers().insert(id.to_string(), timer) {
            previous.cancel();
        }
    }

    /// Returns whether a timer was armed
    fn cancel_timer(&self, id: &str) -> bool {
        match self.timers().remove(id) {
            Some(timer) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    /// Run one reconciliation, waiting for the task to be free
    async fn execute(&self, id: &str) -> Result<Reconciliation> {
        let (_, _, gate) = self.entry_parts(id)?;
        let _running = gate.lock().await;
        self.execute_locked(id).await
    }

    /// Scheduled firing: skipped when the task is busy or no longer enabled
    async fn tick(&self, id: &str) {
        let Ok((task, _, gate)) = self.entry_parts(id) else {
            return;
        };
        if !task.enabled {
            return;
        }
        let Ok(_running) = gate.try_lock() else {
            debug!(task_id = %id, "Previous run still in progress, skipping tick");
            return;
        };

        match self.execute_locked(id).await {
            Ok(outcome) => debug!(task_id = %id, updated = outcome.updated, "Tick complete"),
            Err(e) if e.is_transient() => warn!(task_id = %id, "Tick failed: {}", e),
            Err(e) => error!(task_id = %id, "Tick failed: {}", e),
        }
    }

    /// Caller holds the task's gate
    async fn execute_locked(&self, id: &str) -> Result<Reconciliation> {
        let _slot = self
            .workers
            .acquire()
            .await
            .map_err(|_| Error::Other("scheduler is shut down".to_string()))?;

        // Snapshot after acquiring the gate so the previous run's outcome is seen
        let (task, provider, _) = self.entry_parts(id)?;
        let result = self.reconciler.reconcile(&task, provider.as_ref()).await;

        let applied = self.with_task_mut(id, |task| match &result {
            Ok(outcome) => task.record_success(outcome.updated.then_some(outcome.address)),
            Err(e) => task.record_failure(e.to_string()),
        });

        // Deleted while running: nothing left to record
        if applied.is_ok() {
            if let Err(e) = self.persist().await {
                error!(task_id = %id, "Failed to persist run outcome: {}", e);
            }
        }

        result
    }

    async fn persist(&self) -> Result<()> {
        let _writer = self.persist_lock.lock().await;
        let snapshot: Vec<Task> = self.tasks().values().map(|e| e.task.clone()).collect();
        self.store
            .save(&snapshot)
            .await
            .inspect_err(|e| self.log.error(format!("failed to persist tasks: {}", e)))
    }
}
