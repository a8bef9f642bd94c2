// # Task Store Implementations
//
// This module provides implementations of the TaskStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

use std::sync::Arc;

pub use file::FileTaskStore;
pub use memory::MemoryTaskStore;

use crate::config::StoreConfig;
use crate::traits::TaskStore;

/// Open the task store described by `config`
pub async fn open_store(config: &StoreConfig) -> crate::Result<Arc<dyn TaskStore>> {
    config.validate()?;
    match config {
        StoreConfig::File { path } => Ok(Arc::new(FileTaskStore::new(path).await?)),
        StoreConfig::Memory => Ok(Arc::new(MemoryTaskStore::new())),
    }
}
