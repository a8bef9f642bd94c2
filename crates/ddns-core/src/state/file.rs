// # File Task Store
//
// File-based implementation of TaskStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: new content goes to a `.tmp` file which is renamed over
//   the task file
// - Automatic backup: the previous task file is kept as `.backup`
// - Recovery: a task file that fails to parse falls back to the backup, and
//   the task file is restored from it
//
// ## File Format
//
// ```json
// [
//   {
//     "id": "3f2a9c1e",
//     "provider": "tencent",
//     "credentials": { "secret_id": "...", "secret_key": "..." },
//     "domain": "example.com",
//     "host": "www",
//     "full_domain": "www.example.com",
//     "record_type": "A",
//     "service_url": "https://ipv4.icanhazip.com",
//     "service_name": "icanhazip",
//     "interval_secs": 300,
//     "enabled": true,
//     "last_ip": "203.0.113.5",
//     "last_update": "2025-01-09T12:00:00Z",
//     "status": "running",
//     "last_error": null
//   }
// ]
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::task::Task;
use crate::traits::TaskStore;

/// File-based task store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::state::FileTaskStore;
/// use ddns_core::traits::TaskStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileTaskStore::new("/var/lib/ddns/ddns_tasks.json").await?;
///     let tasks = store.load().await?;
///     store.save(&tasks).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileTaskStore {
    path: PathBuf,
    /// Serializes rewrites of the task file
    write_lock: Mutex<()>,
}

impl FileTaskStore {
    /// Open a file task store, creating parent directories if needed
    ///
    /// The file itself is only created by the first save.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create task store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load tasks with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Missing task file: empty task set
    /// 2. Unparsable task file: load the backup and restore the task file from it
    /// 3. Backup missing or unparsable too: error, nothing is overwritten
    async fn load_with_recovery(&self) -> Result<Vec<Task>, Error> {
        let parse_error = match Self::read_tasks(&self.path).await {
            Ok(tasks) => {
                tracing::debug!("Loaded {} tasks from {}", tasks.len(), self.path.display());
                return Ok(tasks);
            }
            Err(Error::Json(e)) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!(
            "Task file {} appears corrupted: {}. Attempting recovery from backup.",
            self.path.display(),
            parse_error
        );

        let backup_path = Self::backup_path(&self.path);
        if !backup_path.exists() {
            return Err(Error::state_store(format!(
                "Task file {} is corrupted ({}) and no backup exists",
                self.path.display(),
                parse_error
            )));
        }

        let tasks = Self::read_tasks(&backup_path).await.map_err(|backup_err| {
            Error::state_store(format!(
                "Task file {} is corrupted ({}) and the backup is unusable ({})",
                self.path.display(),
                parse_error,
                backup_err
            ))
        })?;
        tracing::info!("Recovered {} tasks from backup", tasks.len());

        if let Err(e) = fs::copy(&backup_path, &self.path).await {
            tracing::error!("Failed to restore task file from backup: {}", e);
        }

        Ok(tasks)
    }

    async fn read_tasks(path: &Path) -> Result<Vec<Task>, Error> {
        if !path.exists() {
            tracing::debug!("Task file does not exist: {}", path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::state_store(format!("Failed to read task file {}: {}", path.display(), e))
        })?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_str(&content)?)
    }

    /// Write tasks to file atomically
    async fn write_tasks(&self, tasks: &[Task]) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(tasks)
            .map_err(|e| Error::state_store(format!("Failed to serialize tasks: {}", e)))?;

        let _guard = self.write_lock.lock().await;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("{} tasks written to {}", tasks.len(), self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn load(&self) -> Result<Vec<Task>, Error> {
        self.load_with_recovery().await
    }

    async fn save(&self, tasks: &[Task]) -> Result<(), Error> {
        self.write_tasks(tasks).await
    }
}
