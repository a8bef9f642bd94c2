//! Task domain model
//!
//! A [`Task`] is one configured (domain, host, provider, credentials, interval)
//! unit that the scheduler keeps pointed at the detected public address.
//! Tasks are created from a [`NewTask`] by the scheduler, which assigns the
//! identifier and derives the full domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::{Error, Result};

/// Host value that addresses the root domain itself
pub const APEX_HOST: &str = "@";

/// Length of generated task identifiers
const TASK_ID_LEN: usize = 8;

/// Longest accepted schedule interval (one year)
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Cloud DNS vendor a task writes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Tencent,
    Aliyun,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Tencent => "tencent",
            ProviderKind::Aliyun => "aliyun",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tencent" => Ok(ProviderKind::Tencent),
            "aliyun" => Ok(ProviderKind::Aliyun),
            other => Err(Error::validation(format!("Unknown provider: {}", other))),
        }
    }
}

/// IP version (v4 or v6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }

    pub fn matches(&self, addr: &IpAddr) -> bool {
        IpVersion::of(addr) == *self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::V4 => "ipv4",
            IpVersion::V6 => "ipv6",
        }
    }
}

/// DNS record type managed by a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A record (IPv4)
    #[default]
    A,
    /// AAAA record (IPv6)
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Wire name used by DNS APIs
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }

    pub fn ip_version(&self) -> IpVersion {
        match self {
            RecordType::A => IpVersion::V4,
            RecordType::Aaaa => IpVersion::V6,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Stopped,
    Running,
    Error,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Stopped => "stopped",
            TaskStatus::Running => "running",
            TaskStatus::Error => "error",
        })
    }
}

/// Provider credential pair
///
/// The secret key never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<REDACTED>")
            .finish()
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub provider: ProviderKind,
    pub credentials: Credentials,
    pub domain: String,
    /// Subdomain, or [`APEX_HOST`] for the root domain
    pub host: String,
    #[serde(default)]
    pub record_type: RecordType,
    pub service_url: String,
    pub service_name: String,
    pub interval_secs: u64,
}

impl NewTask {
    /// Check that every required field is present
    pub fn validate(&self) -> Result<()> {
        require("domain", &self.domain)?;
        require("host", &self.host)?;
        require("secret_id", &self.credentials.secret_id)?;
        require("secret_key", &self.credentials.secret_key)?;
        validate_schedule(self.interval_secs, &self.service_url)
    }

    /// Materialize a stopped, disabled task with a fresh identifier
    pub(crate) fn into_task(self) -> Task {
        let domain = self.domain.trim().to_string();
        let host = self.host.trim().to_string();
        let full_domain = full_domain(&host, &domain);

        Task {
            id: generate_task_id(),
            provider: self.provider,
            credentials: self.credentials,
            domain,
            host,
            full_domain,
            record_type: self.record_type,
            service_url: self.service_url.trim().to_string(),
            service_name: self.service_name,
            interval_secs: self.interval_secs,
            enabled: false,
            last_ip: None,
            last_update: None,
            status: TaskStatus::Stopped,
            last_error: None,
        }
    }
}

/// A scheduled DDNS task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub provider: ProviderKind,
    pub credentials: Credentials,
    pub domain: String,
    pub host: String,
    pub full_domain: String,
    #[serde(default)]
    pub record_type: RecordType,
    pub service_url: String,
    pub service_name: String,
    pub interval_secs: u64,
    pub enabled: bool,
    pub last_ip: Option<IpAddr>,
    pub last_update: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub last_error: Option<String>,
}

impl Task {
    /// Recompute derived fields after loading or editing location fields
    pub fn refresh_derived(&mut self) {
        self.full_domain = full_domain(&self.host, &self.domain);
    }

    /// Record a successful execution
    ///
    /// `written` is the address pushed to the provider, if a write happened.
    pub(crate) fn record_success(&mut self, written: Option<IpAddr>) {
        if let Some(addr) = written {
            self.last_ip = Some(addr);
            self.last_update = Some(Utc::now());
        }
        self.last_error = None;
        self.status = if self.enabled {
            TaskStatus::Running
        } else {
            TaskStatus::Stopped
        };
    }

    /// Record a failed execution; the last known address is left alone
    pub(crate) fn record_failure(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.last_update = Some(Utc::now());
        self.status = if self.enabled {
            TaskStatus::Error
        } else {
            TaskStatus::Stopped
        };
    }

    pub(crate) fn mark_started(&mut self) {
        self.enabled = true;
        self.status = TaskStatus::Running;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.enabled = false;
        self.status = TaskStatus::Stopped;
    }
}

/// Full domain for a host under a root domain
pub fn full_domain(host: &str, domain: &str) -> String {
    if host.is_empty() || host == APEX_HOST {
        domain.to_string()
    } else {
        format!("{}.{}", host, domain)
    }
}

pub(crate) fn validate_schedule(interval_secs: u64, service_url: &str) -> Result<()> {
    if interval_secs == 0 {
        return Err(Error::validation("interval must be > 0"));
    }
    if interval_secs > MAX_INTERVAL_SECS {
        return Err(Error::validation(format!(
            "interval must be at most {} seconds",
            MAX_INTERVAL_SECS
        )));
    }
    require("service_url", service_url)
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn generate_task_id() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(TASK_ID_LEN)
        .collect()
}
