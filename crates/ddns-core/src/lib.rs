// # ddns-core
//
// Core library for the multi-task DDNS scheduler.
//
// ## Architecture Overview
//
// This library keeps DNS records pointed at the host's current public address:
// - **Task**: One (domain, host, provider, credentials, interval) unit
// - **AddressResolver**: Detects the current address with fallback across services
// - **DnsProvider**: Trait for finding and writing records via provider APIs
// - **Reconciler**: Decides whether a write is needed and performs it
// - **OperationLog**: Bounded audit trail of outcomes
// - **TaskScheduler**: Owns tasks, timers and persistence
// - **ProviderRegistry**: Plugin-based registry for DNS providers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from I/O implementations
// 2. **Plugin-Based**: Providers are registered dynamically, no hard-coded if-else
// 3. **Library-First**: All core functionality can be used as a library
// 4. **One Run Per Task**: Reconciliations of the same task never overlap

pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod oplog;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod task;
pub mod traits;

// Re-export core types for convenience
pub use address::{AddressResolver, AddressService, ServiceCatalog};
pub use config::{ResolverConfig, SchedulerConfig, StoreConfig};
pub use engine::{Reconciler, Reconciliation};
pub use error::{Error, Result};
pub use oplog::{LogEntry, OperationLog, Severity};
pub use registry::ProviderRegistry;
pub use scheduler::TaskScheduler;
pub use state::{FileTaskStore, MemoryTaskStore};
pub use task::{Credentials, IpVersion, NewTask, ProviderKind, RecordType, Task, TaskStatus};
pub use traits::{AddressProbe, DnsLookup, DnsProvider, DnsProviderFactory, RecordHandle, TaskStore};
