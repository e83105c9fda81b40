//! Process registry — the supervisor's runtime source of truth.
//!
//! A single owned, concurrency-safe map from bot id to live process handle
//! and start time. All mutation goes through the methods here; nothing else
//! holds the map. Entries are never persisted and are lost when the daemon
//! restarts (see the limitation note in `supervisor/mod.rs`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use super::bot_process::BotProcess;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no registry entry for bot '{bot_id}'")]
    NotFound { bot_id: String },
    #[error("lock poisoned")]
    LockPoisoned,
}

/// A live subordinate process known to the supervisor.
#[derive(Clone)]
pub struct RegistryEntry {
    pub process: Arc<BotProcess>,
    /// Unix timestamp recorded when the launch succeeded.
    pub started_at: u64,
}

pub struct ProcessRegistry {
    entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, RegistryEntry>>, RegistryError> {
        self.entries.lock().map_err(|e| {
            tracing::error!("ProcessRegistry lock poisoned: {}", e);
            RegistryError::LockPoisoned
        })
    }

    /// Register a process for a bot. Returns the recorded start time.
    /// Replaces any prior entry for the same id.
    pub fn insert(&self, bot_id: &str, process: BotProcess) -> Result<u64, RegistryError> {
        let started_at = current_timestamp();
        let pid = process.pid;
        let entry = RegistryEntry {
            process: Arc::new(process),
            started_at,
        };
        let mut entries = self.lock()?;
        entries.insert(bot_id.to_string(), entry);
        tracing::info!("Registered bot '{}' with PID {}", bot_id, pid);
        Ok(started_at)
    }

    pub fn get(&self, bot_id: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        let entries = self.lock()?;
        Ok(entries.get(bot_id).cloned())
    }

    pub fn pid(&self, bot_id: &str) -> Result<u32, RegistryError> {
        let entries = self.lock()?;
        entries
            .get(bot_id)
            .map(|e| e.process.pid)
            .ok_or(RegistryError::NotFound {
                bot_id: bot_id.to_string(),
            })
    }

    pub fn contains(&self, bot_id: &str) -> Result<bool, RegistryError> {
        let entries = self.lock()?;
        Ok(entries.contains_key(bot_id))
    }

    /// Remove and return the entry for a bot.
    pub fn remove(&self, bot_id: &str) -> Result<RegistryEntry, RegistryError> {
        let mut entries = self.lock()?;
        let entry = entries.remove(bot_id).ok_or(RegistryError::NotFound {
            bot_id: bot_id.to_string(),
        })?;
        tracing::info!("Removed registry entry for bot '{}'", bot_id);
        Ok(entry)
    }

    /// Remove an entry if present; missing entries are a no-op. Used by the
    /// exit/error observers, which may race with an explicit stop.
    pub fn evict(&self, bot_id: &str) -> Result<(), RegistryError> {
        let mut entries = self.lock()?;
        if entries.remove(bot_id).is_some() {
            tracing::info!("Evicted registry entry for bot '{}'", bot_id);
        }
        Ok(())
    }

    pub fn ids(&self) -> Result<Vec<String>, RegistryError> {
        let entries = self.lock()?;
        Ok(entries.keys().cloned().collect())
    }

    pub fn len(&self) -> Result<usize, RegistryError> {
        let entries = self.lock()?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tokio::sync::mpsc;

    async fn spawn_sleeper(bot_id: &str) -> BotProcess {
        let (tx, _rx) = mpsc::channel(8);
        BotProcess::spawn(bot_id, bot_id, "sleep", &["30".to_string()], Path::new("."), tx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let registry = ProcessRegistry::new();
        let process = spawn_sleeper("b1").await;
        let pid = process.pid;

        let started_at = registry.insert("b1", process).unwrap();
        assert!(started_at > 0);
        assert!(registry.contains("b1").unwrap());
        assert_eq!(registry.pid("b1").unwrap(), pid);

        let entry = registry.remove("b1").unwrap();
        entry.process.terminate().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_bot_is_not_found() {
        let registry = ProcessRegistry::new();
        assert!(!registry.contains("ghost").unwrap());
        assert!(registry.get("ghost").unwrap().is_none());
        assert!(matches!(
            registry.pid("ghost"),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(matches!(
            registry.remove("ghost"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_evict_is_idempotent() {
        let registry = ProcessRegistry::new();
        let process = spawn_sleeper("b1").await;
        registry.insert("b1", process).unwrap();

        // Terminate before evicting so nothing leaks.
        registry.get("b1").unwrap().unwrap().process.terminate().unwrap();

        registry.evict("b1").unwrap();
        assert!(!registry.contains("b1").unwrap());
        // Second eviction is a no-op, not an error.
        registry.evict("b1").unwrap();
    }

    #[tokio::test]
    async fn test_insert_replaces_existing_entry() {
        let registry = ProcessRegistry::new();
        let first = spawn_sleeper("b1").await;
        let second = spawn_sleeper("b1").await;
        let first_pid = first.pid;
        let second_pid = second.pid;

        registry.insert("b1", first).unwrap();
        registry.insert("b1", second).unwrap();
        assert_eq!(registry.pid("b1").unwrap(), second_pid);
        assert_eq!(registry.len().unwrap(), 1);

        // Clean up both processes.
        let _ = nix_kill(first_pid);
        registry.remove("b1").unwrap().process.terminate().unwrap();
    }

    #[cfg(unix)]
    fn nix_kill(pid: u32) -> anyhow::Result<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;
        signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)?;
        Ok(())
    }

    #[tokio::test]
    async fn test_ids_snapshot() {
        let registry = ProcessRegistry::new();
        assert!(registry.is_empty().unwrap());

        registry.insert("a", spawn_sleeper("a").await).unwrap();
        registry.insert("b", spawn_sleeper("b").await).unwrap();

        let mut ids = registry.ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        for id in ids {
            registry.remove(&id).unwrap().process.terminate().unwrap();
        }
    }
}
