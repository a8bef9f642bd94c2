// # ddnsd - DDNS Daemon
//
// Thin integration layer hosting the task scheduler. All DDNS logic lives
// in ddns-core; this binary only wires it up:
//
// 1. Read configuration from environment variables
// 2. Initialize logging and the runtime
// 3. Register provider factories and address probes
// 4. Open the task store and start every enabled task
// 5. Wait for SIGTERM/SIGINT, then shut the scheduler down
//
// ## Configuration
//
// ### Task Store
// - `DDNS_STORE_TYPE`: `file` (default) or `memory`
// - `DDNS_STORE_PATH`: Path to the task file (default `ddns_tasks.json`)
//
// ### Scheduler
// - `DDNS_WORKERS`: Concurrent reconciliations (default 10)
// - `DDNS_LOG_CAPACITY`: Operation log entries kept (default 100)
// - `DDNS_PROVIDER_DEADLINE_SECS`: Deadline for one provider call (default 30)
// - `DDNS_RECORD_TTL`: TTL written with every record (default 600)
//
// ### Address Detection
// - `DDNS_IP_TIMEOUT_SECS`: Per-service request timeout (default 5)
// - `DDNS_BATCH_DEADLINE_SECS`: Deadline when querying all services (default 10)
// - `DDNS_IP_SERVICES_FILE`: Extra HTTP services, one URL per line
// - `DDNS_LOCAL_INTERFACES_FILE`: Interface monitors, `iface|ipv4` per line
//
// ### Logging
// - `DDNS_LOG_LEVEL`: trace, debug, info (default), warn, error
//
// ## Example
//
// ```bash
// export DDNS_STORE_PATH=/var/lib/ddns/ddns_tasks.json
// export DDNS_IP_SERVICES_FILE=/etc/ddns/ip_services.txt
// export DDNS_LOG_LEVEL=debug
//
// ddnsd
// ```

use anyhow::{Context, Result};
use ddns_core::address::{AddressResolver, ServiceCatalog};
use ddns_core::state::open_store;
use ddns_core::traits::SystemDnsLookup;
use ddns_core::{ProviderRegistry, ResolverConfig, SchedulerConfig, StoreConfig, TaskScheduler};
use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdnsExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
#[derive(Debug)]
struct Config {
    scheduler: SchedulerConfig,
    log_level: Level,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = SchedulerConfig::default();
        let resolver_defaults = ResolverConfig::default();

        let store_type = lookup("DDNS_STORE_TYPE").unwrap_or_else(|| "file".to_string());
        let store = match store_type.to_lowercase().as_str() {
            "file" => StoreConfig::File {
                path: lookup("DDNS_STORE_PATH").unwrap_or_else(|| match &defaults.store {
                    StoreConfig::File { path } => path.clone(),
                    StoreConfig::Memory => "ddns_tasks.json".to_string(),
                }),
            },
            "memory" => StoreConfig::Memory,
            other => anyhow::bail!(
                "DDNS_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                other
            ),
        };

        let resolver = ResolverConfig {
            request_timeout_secs: parse_var(
                &lookup,
                "DDNS_IP_TIMEOUT_SECS",
                resolver_defaults.request_timeout_secs,
            )?,
            batch_deadline_secs: parse_var(
                &lookup,
                "DDNS_BATCH_DEADLINE_SECS",
                resolver_defaults.batch_deadline_secs,
            )?,
            custom_services_file: lookup("DDNS_IP_SERVICES_FILE").filter(|p| !p.is_empty()),
            interface_monitors_file: lookup("DDNS_LOCAL_INTERFACES_FILE").filter(|p| !p.is_empty()),
        };

        let scheduler = SchedulerConfig {
            store,
            resolver,
            worker_slots: parse_var(&lookup, "DDNS_WORKERS", defaults.worker_slots)?,
            log_capacity: parse_var(&lookup, "DDNS_LOG_CAPACITY", defaults.log_capacity)?,
            provider_deadline_secs: parse_var(
                &lookup,
                "DDNS_PROVIDER_DEADLINE_SECS",
                defaults.provider_deadline_secs,
            )?,
            record_ttl: parse_var(&lookup, "DDNS_RECORD_TTL", defaults.record_ttl)?,
            ..defaults
        };

        let log_level = lookup("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                log_level
            ),
        };

        Ok(Self {
            scheduler,
            log_level,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.scheduler
            .validate()
            .context("Invalid scheduler configuration")?;

        if self.scheduler.worker_slots > 256 {
            anyhow::bail!(
                "DDNS_WORKERS must be between 1 and 256. Got: {}",
                self.scheduler.worker_slots
            );
        }

        for (var, file) in [
            ("DDNS_IP_SERVICES_FILE", &self.scheduler.resolver.custom_services_file),
            ("DDNS_LOCAL_INTERFACES_FILE", &self.scheduler.resolver.interface_monitors_file),
        ] {
            if let Some(path) = file {
                if Path::new(path).is_dir() {
                    anyhow::bail!("{} must name a file, not a directory: {}", var, path);
                }
            }
        }

        Ok(())
    }
}

/// Parse `name` as `T`, falling back to `default` when unset
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", name, raw, e)),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddnsd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => DdnsExitCode::CleanShutdown,
            Err(e) if e.is::<ddns_core::Error>() => {
                error!("Startup failed: {:#}", e);
                DdnsExitCode::ConfigError
            }
            Err(e) => {
                error!("Daemon error: {:#}", e);
                DdnsExitCode::RuntimeError
            }
        }
    });

    result.into()
}

fn build_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "tencent")]
    {
        info!("Registering Tencent Cloud DNSPod provider");
        ddns_provider_tencent::register(&registry);
    }

    #[cfg(feature = "aliyun")]
    {
        info!("Registering Alibaba Cloud DNS provider");
        ddns_provider_aliyun::register(&registry);
    }

    if registry.list_providers().is_empty() {
        warn!("No DNS providers compiled in; stored tasks cannot be loaded");
    }

    registry
}

fn build_resolver(config: &ResolverConfig) -> Result<AddressResolver> {
    let catalog = ServiceCatalog::load(
        config.custom_services_file.as_deref().map(Path::new),
        config.interface_monitors_file.as_deref().map(Path::new),
    )?;
    info!("Address service catalog holds {} services", catalog.len());

    let http = ddns_ip_http::HttpProbe::with_timeout(config.request_timeout())?;
    let resolver = AddressResolver::new(catalog, config.request_timeout(), config.batch_deadline())
        .with_probe(Arc::new(http));

    #[cfg(feature = "interface")]
    let resolver = resolver.with_probe(Arc::new(ddns_ip_interface::InterfaceProbe::new()));

    Ok(resolver)
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: Config) -> Result<()> {
    let settings = config.scheduler;

    let registry = Arc::new(build_registry());
    let resolver = build_resolver(&settings.resolver)?;
    let store = open_store(&settings.store).await?;
    let dns = Arc::new(SystemDnsLookup::new(settings.dns_lookup_timeout()));

    match &settings.store {
        StoreConfig::File { path } => info!("Task store: {}", path),
        StoreConfig::Memory => warn!("Task store is in memory; tasks are lost on exit"),
    }

    let scheduler = TaskScheduler::new(&settings, registry, store, resolver, dns);
    let loaded = scheduler.init().await?;

    let running = scheduler.list_all().iter().filter(|t| t.enabled).count();
    info!(
        tasks = loaded,
        running,
        workers = settings.worker_slots,
        "Scheduler running"
    );

    let signal = wait_for_shutdown().await;

    match &signal {
        Ok(name) => info!("Received shutdown signal: {}", name),
        Err(e) => error!("Signal handling failed, shutting down: {}", e),
    }

    scheduler.shutdown().await?;
    info!("Scheduler stopped, {} operation log entries this run", scheduler.log_count());

    signal.map(|_| ())
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
