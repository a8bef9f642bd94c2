// # Task Store Trait
//
// Durable storage for the full set of task records.
//
// ## Implementations
//
// - `FileTaskStore`: one JSON file, rewritten atomically on each save
// - `MemoryTaskStore`: non-persistent, for tests and embedding

use async_trait::async_trait;

use crate::task::Task;

/// Trait for task persistence
///
/// The store is always written wholesale. The scheduler serializes calls to
/// `save`, so implementations only need to make a single write atomic.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Read every stored task
    async fn load(&self) -> Result<Vec<Task>, crate::Error>;

    /// Replace the stored tasks with `tasks`
    async fn save(&self, tasks: &[Task]) -> Result<(), crate::Error>;
}
