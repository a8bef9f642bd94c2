//! Configuration types for the DDNS scheduler
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Where task records are persisted
    #[serde(default)]
    pub store: StoreConfig,

    /// Address resolution settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Number of reconciliations allowed to run at the same time
    #[serde(default = "default_worker_slots")]
    pub worker_slots: usize,

    /// Maximum number of operation log entries kept in memory
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Timeout for the live DNS lookup of a task's full domain (in seconds)
    #[serde(default = "default_dns_lookup_timeout_secs")]
    pub dns_lookup_timeout_secs: u64,

    /// Overall deadline for one provider call (in seconds)
    #[serde(default = "default_provider_deadline_secs")]
    pub provider_deadline_secs: u64,

    /// TTL written with every record
    #[serde(default = "default_record_ttl")]
    pub record_ttl: u32,

    /// How long shutdown waits for timer loops to wind down (in seconds)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl SchedulerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.worker_slots == 0 {
            return Err(crate::Error::config("worker_slots must be > 0"));
        }
        if self.log_capacity == 0 {
            return Err(crate::Error::config("log_capacity must be > 0"));
        }
        if self.provider_deadline_secs == 0 {
            return Err(crate::Error::config("provider_deadline_secs must be > 0"));
        }
        if self.record_ttl == 0 {
            return Err(crate::Error::config("record_ttl must be > 0"));
        }

        self.store.validate()?;
        self.resolver.validate()?;

        Ok(())
    }

    pub fn provider_deadline(&self) -> Duration {
        Duration::from_secs(self.provider_deadline_secs)
    }

    pub fn dns_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_lookup_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            resolver: ResolverConfig::default(),
            worker_slots: default_worker_slots(),
            log_capacity: default_log_capacity(),
            dns_lookup_timeout_secs: default_dns_lookup_timeout_secs(),
            provider_deadline_secs: default_provider_deadline_secs(),
            record_ttl: default_record_ttl(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// Task store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON file holding every task, rewritten atomically on each mutation
    File {
        /// Path to the task file
        path: String,
    },

    /// In-memory store (not persistent)
    Memory,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("Task store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            path: default_store_path(),
        }
    }
}

/// Address resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Per-request timeout for one address service (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Collection deadline for the "fetch all services" mode (in seconds)
    #[serde(default = "default_batch_deadline_secs")]
    pub batch_deadline_secs: u64,

    /// File listing extra HTTP services, one URL per line
    #[serde(default)]
    pub custom_services_file: Option<String>,

    /// File listing monitored interfaces, one `iface|ipv4` or `iface|ipv6` per line
    #[serde(default)]
    pub interface_monitors_file: Option<String>,
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("request_timeout_secs must be > 0"));
        }
        if self.batch_deadline_secs == 0 {
            return Err(crate::Error::config("batch_deadline_secs must be > 0"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_secs(self.batch_deadline_secs)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            batch_deadline_secs: default_batch_deadline_secs(),
            custom_services_file: None,
            interface_monitors_file: None,
        }
    }
}

fn default_store_path() -> String {
    "ddns_tasks.json".to_string()
}

fn default_worker_slots() -> usize {
    10
}

fn default_log_capacity() -> usize {
    100
}

fn default_dns_lookup_timeout_secs() -> u64 {
    5
}

fn default_provider_deadline_secs() -> u64 {
    30
}

fn default_record_ttl() -> u32 {
    600
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_batch_deadline_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SchedulerConfig::default();
        assert_eq!(config.worker_slots, 10);
        assert_eq!(config.log_capacity, 100);
        assert_eq!(config.record_ttl, 600);
        assert_eq!(config.resolver.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.resolver.batch_deadline(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"store": {"type": "memory"}, "worker_slots": 3}"#).unwrap();
        assert!(matches!(config.store, StoreConfig::Memory));
        assert_eq!(config.worker_slots, 3);
        assert_eq!(config.log_capacity, 100);
    }

    #[test]
    fn zero_workers_rejected() {
        let config = SchedulerConfig {
            worker_slots: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_store_path_rejected() {
        let config = SchedulerConfig {
            store: StoreConfig::File {
                path: "  ".to_string(),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
