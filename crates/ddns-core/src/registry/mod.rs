//! Plugin-based provider registry
//!
//! DNS provider adapters register a factory under their [`ProviderKind`];
//! the scheduler asks the registry for one adapter per task, built from that
//! task's credentials. No call site branches on the provider.
//!
//! ## Registration
//!
//! Adapter crates expose a `register` function:
//!
//! ```rust,ignore
//! // In ddns-provider-tencent crate
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider(ProviderKind::Tencent, Box::new(TencentFactory::default()));
//! }
//! ```

use crate::error::{Error, Result};
use crate::task::{Credentials, ProviderKind};
use crate::traits::{DnsProvider, DnsProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Provider registry for plugin-based DNS provider creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<ProviderKind, Box<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `kind`
    pub fn register_provider(&self, kind: ProviderKind, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        if providers.insert(kind, factory).is_some() {
            tracing::debug!("Replaced provider factory for {}", kind);
        }
    }

    /// Build an adapter for `kind` bound to `credentials`
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)`: if no factory is registered for `kind`
    /// - the factory's own error if it rejects the credentials
    pub fn create_provider(
        &self,
        kind: ProviderKind,
        credentials: &Credentials,
    ) -> Result<Arc<dyn DnsProvider>> {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());

        let factory = providers
            .get(&kind)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", kind)))?;

        factory.create(credentials).map(Arc::from)
    }

    /// List all registered provider kinds
    pub fn list_providers(&self) -> Vec<ProviderKind> {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());
        providers.keys().copied().collect()
    }

    /// Check if a provider kind is registered
    pub fn has_provider(&self, kind: ProviderKind) -> bool {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());
        providers.contains_key(&kind)
    }
}
