// # Memory Task Store
//
// In-memory implementation of TaskStore.
//
// ## Purpose
//
// Holds the last saved task set for the lifetime of the process. Useful for
// tests and for embedding the scheduler where persistence is handled
// elsewhere.
//
// ## Crash Behavior
//
// - All tasks are lost on restart/crash
// - No recovery possible (state is in-memory only)

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::Error;
use crate::task::Task;
use crate::traits::TaskStore;

/// In-memory task store implementation
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryTaskStore {
    tasks: Arc<RwLock<Vec<Task>>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryTaskStore {
    /// Create a new empty memory task store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `tasks`
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(tasks)),
            saves: Arc::default(),
        }
    }

    /// Copy of the last saved task set
    pub async fn snapshot(&self) -> Vec<Task> {
        self.tasks.read().await.clone()
    }

    /// Number of completed saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn load(&self) -> Result<Vec<Task>, Error> {
        Ok(self.snapshot().await)
    }

    async fn save(&self, tasks: &[Task]) -> Result<(), Error> {
        *self.tasks.write().await = tasks.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
