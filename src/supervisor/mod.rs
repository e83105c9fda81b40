//! Process supervision — mapping bot records onto OS processes.
//!
//! The supervisor owns the process registry and is the only writer of the
//! `running`/`started_at`/`uptime_seconds` fields on bot records. All
//! mutations are serialized through `&mut self` (the daemon wraps the
//! supervisor in an `RwLock` and takes the write half for every mutation),
//! so launch's check-and-set is atomic with respect to a concurrent launch
//! for the same id.
//!
//! Known limitation, kept deliberately: the registry lives only in memory.
//! If the daemon itself restarts or crashes, every subordinate process is
//! orphaned — the first reconcile pass corrects the persisted `running`
//! flags to false, but the orphaned OS processes are not re-adopted (there
//! is no process-table scan).

pub mod bot_process;
pub mod error;
pub mod registry;

use anyhow::Result;
use std::path::PathBuf;
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc;

use crate::bot::{current_timestamp, Bot, BotStore};
use crate::inject::CredentialInjector;
use crate::process_monitor;
use bot_process::{BotProcess, ProcessEvent};
use error::SupervisorError;
use registry::{ProcessRegistry, RegistryError};

pub struct Supervisor {
    pub registry: ProcessRegistry,
    pub store: BotStore,
    injector: CredentialInjector,
    working_dir: PathBuf,
    event_tx: mpsc::Sender<ProcessEvent>,
}

impl Supervisor {
    /// Create a supervisor and the receiving half of its lifecycle-event
    /// channel. The caller drives the returned receiver through
    /// [`Supervisor::handle_event`].
    pub fn new(
        bots_file: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> (Self, mpsc::Receiver<ProcessEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let supervisor = Self {
            registry: ProcessRegistry::new(),
            store: BotStore::new(bots_file),
            injector: CredentialInjector::new(),
            working_dir: working_dir.into(),
            event_tx,
        };
        (supervisor, event_rx)
    }

    pub fn initialize(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.working_dir)?;
        self.store.load()?;
        tracing::info!(
            "Supervisor initialized with {} bots, working dir {}",
            self.store.list().len(),
            self.working_dir.display()
        );
        Ok(())
    }

    /// Launch a bot's process.
    ///
    /// Returns as soon as the process has started (or failed to start),
    /// never when it exits. No failure path leaves a registry entry behind.
    pub async fn launch(&mut self, bot_id: &str) -> Result<(), SupervisorError> {
        let bot = self
            .store
            .get(bot_id)
            .cloned()
            .ok_or_else(|| SupervisorError::BotNotFound(bot_id.to_string()))?;

        // Double-launch check against the registry, not only the persisted
        // flag. A stale entry whose process already died is evicted here so
        // a relaunch does not have to wait for the next reconcile pass.
        if let Some(entry) = self.registry.get(bot_id)? {
            if entry.process.is_running() {
                return Err(SupervisorError::AlreadyRunning(bot_id.to_string()));
            }
            self.registry.evict(bot_id)?;
        }

        let strategy = bot.language.strategy();
        if strategy.run.is_empty() {
            return Err(SupervisorError::UnresolvedStrategy(bot_id.to_string()));
        }

        let injected = self.injector.inject(&bot.source, &bot.credential, bot.language);
        let work_file = self.working_dir.join(bot.working_file_name());
        tokio::fs::write(&work_file, injected).await.map_err(|e| {
            SupervisorError::SpawnFailed(format!(
                "failed to write working file {}: {}",
                work_file.display(),
                e
            ))
        })?;

        // A leftover stop sentinel would make a cooperative bot exit
        // immediately after start.
        let sentinel = self.working_dir.join(bot.sentinel_file_name());
        let _ = tokio::fs::remove_file(&sentinel).await;

        if let Some(compile) = strategy.compile {
            let mut cmd = TokioCommand::new(compile[0]);
            cmd.args(&compile[1..])
                .arg(&work_file)
                .current_dir(&self.working_dir);
            crate::utils::apply_creation_flags(&mut cmd);

            match cmd.output().await {
                Ok(output) if output.status.success() => {}
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(SupervisorError::CompileFailed(format!(
                        "{} exited with {}: {}",
                        compile[0],
                        output.status,
                        stderr.trim()
                    )));
                }
                Err(e) => {
                    return Err(SupervisorError::CompileFailed(format!(
                        "failed to run {}: {}",
                        compile[0], e
                    )));
                }
            }
        }

        let mut args: Vec<String> = strategy.run[1..].iter().map(|s| s.to_string()).collect();
        if strategy.runs_artifact() {
            // Compiled languages invoke the artifact stem, not the file path.
            args.push(format!("bot_{}", bot.id));
        } else {
            args.push(work_file.to_string_lossy().to_string());
        }

        let process = BotProcess::spawn(
            &bot.id,
            &bot.name,
            strategy.run[0],
            &args,
            &self.working_dir,
            self.event_tx.clone(),
        )
        .await
        .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;

        let started_at = self.registry.insert(&bot.id, process)?;

        if let Some(record) = self.store.get_mut(bot_id) {
            record.running = true;
            record.started_at = Some(started_at);
            record.uptime_seconds = 0;
        }
        self.store.save().map_err(SupervisorError::Internal)?;

        Ok(())
    }

    /// Request termination of a bot's process.
    ///
    /// The registry entry is removed immediately rather than waiting for the
    /// exit observer, so a stop never appears to have no effect. The exit
    /// event that fires later for the same process no-ops on the missing
    /// entry.
    pub async fn stop(&mut self, bot_id: &str) -> Result<(), SupervisorError> {
        let entry = match self.registry.remove(bot_id) {
            Ok(entry) => entry,
            Err(RegistryError::NotFound { .. }) => {
                return Err(SupervisorError::ProcessNotFound(bot_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = entry.process.terminate() {
            // Cooperative fallback: write the stop sentinel the subordinate
            // may poll. Best-effort — never awaited, never retried.
            tracing::warn!(
                "Failed to signal bot '{}': {}; writing stop sentinel",
                bot_id,
                e
            );
            if let Some(bot) = self.store.get(bot_id) {
                let sentinel = self.working_dir.join(bot.sentinel_file_name());
                if let Err(e) = tokio::fs::write(&sentinel, "stop").await {
                    tracing::warn!("Failed to write stop sentinel for '{}': {}", bot_id, e);
                }
            }
        }

        if let Some(record) = self.store.get_mut(bot_id) {
            record.running = false;
        }
        self.store.save().map_err(SupervisorError::Internal)?;
        tracing::info!("Bot '{}' stopped", bot_id);
        Ok(())
    }

    /// Apply a lifecycle event published by a subordinate process.
    ///
    /// Idempotent: the event may race with an explicit stop for the same id,
    /// in which case the registry entry is already gone and the persisted
    /// flag already false.
    pub fn handle_event(&mut self, event: ProcessEvent) {
        let bot_id = event.bot_id().to_string();
        match &event {
            ProcessEvent::Exited { code, .. } => {
                tracing::info!("Bot '{}' process exited (code: {:?})", bot_id, code);
            }
            ProcessEvent::Errored { reason, .. } => {
                tracing::error!("Bot '{}' process errored: {}", bot_id, reason);
            }
        }

        if let Err(e) = self.registry.evict(&bot_id) {
            tracing::error!("Failed to evict registry entry for '{}': {}", bot_id, e);
        }

        let mut changed = false;
        if let Some(record) = self.store.get_mut(&bot_id) {
            if record.running {
                record.running = false;
                changed = true;
            }
        }
        if changed {
            if let Err(e) = self.store.save() {
                tracing::error!("Failed to persist exit of bot '{}': {}", bot_id, e);
            }
        }

        // No restart policy: a crashed bot stays stopped until it is
        // relaunched explicitly.
    }

    /// Reconcile persisted running state against actual process liveness.
    ///
    /// Runs on the periodic interval and on demand. Corrections are logged
    /// and persisted, never surfaced as caller-visible errors. The whole
    /// collection is persisted at most once per pass.
    pub async fn reconcile(&mut self) -> Result<()> {
        let now = current_timestamp();
        let ids: Vec<String> = self
            .store
            .list()
            .iter()
            .filter(|b| b.running)
            .map(|b| b.id.clone())
            .collect();

        let mut changed = false;
        for id in &ids {
            changed |= self.reconcile_one(id, now).await?;
        }

        if changed {
            self.store.save()?;
        }
        Ok(())
    }

    /// Reconcile a single bot and return its fresh record. Used by read
    /// accessors that need an answer no staler than the probe.
    pub async fn reconcile_bot(&mut self, bot_id: &str) -> Result<Bot, SupervisorError> {
        let bot = self
            .store
            .get(bot_id)
            .cloned()
            .ok_or_else(|| SupervisorError::BotNotFound(bot_id.to_string()))?;

        if bot.running {
            let changed = self
                .reconcile_one(bot_id, current_timestamp())
                .await
                .map_err(SupervisorError::Internal)?;
            if changed {
                self.store.save().map_err(SupervisorError::Internal)?;
            }
        }

        self.store
            .get(bot_id)
            .cloned()
            .ok_or_else(|| SupervisorError::BotNotFound(bot_id.to_string()))
    }

    /// Probe one `running == true` bot. Returns whether its record changed;
    /// the caller persists.
    async fn reconcile_one(&mut self, bot_id: &str, now: u64) -> Result<bool> {
        let entry = self.registry.get(bot_id)?;
        let alive = match &entry {
            Some(e) => process_monitor::is_alive_async(e.process.pid).await,
            None => false,
        };

        if alive {
            let started_at = entry.map(|e| e.started_at).unwrap_or(now);
            if let Some(record) = self.store.get_mut(bot_id) {
                record.uptime_seconds = now.saturating_sub(started_at);
            }
            Ok(true)
        } else {
            self.registry.evict(bot_id)?;
            if let Some(record) = self.store.get_mut(bot_id) {
                record.running = false;
            }
            tracing::warn!(
                "Bot '{}' status corrected — recorded running but process is dead",
                bot_id
            );
            Ok(true)
        }
    }

    /// Gracefully terminate every registered process. Called on daemon
    /// shutdown.
    pub fn shutdown_all(&self) {
        let ids = match self.registry.ids() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Failed to enumerate registry for shutdown: {}", e);
                return;
            }
        };
        for id in ids {
            if let Ok(Some(entry)) = self.registry.get(&id) {
                tracing::info!("[Shutdown] Terminating bot '{}' (PID {})", id, entry.process.pid);
                if let Err(e) = entry.process.terminate() {
                    tracing::warn!("[Shutdown] Failed to terminate bot '{}': {}", id, e);
                }
            }
        }
    }

    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use tempfile::TempDir;

    const CRED: &str = "aaaaaaaaaa.bbbbbbbbbb.cccccccccc";

    fn make_supervisor() -> (Supervisor, mpsc::Receiver<ProcessEvent>, TempDir) {
        let dir = TempDir::new().unwrap();
        let (mut supervisor, rx) =
            Supervisor::new(dir.path().join("bots.json"), dir.path().join("work"));
        supervisor.initialize().unwrap();
        (supervisor, rx, dir)
    }

    fn add_bash_bot(supervisor: &mut Supervisor, source: &str) -> String {
        let bot = Bot::new("shellbot", Language::Bash, source, CRED);
        let id = bot.id.clone();
        supervisor.store.add(bot).unwrap();
        id
    }

    #[tokio::test]
    async fn test_launch_registers_and_marks_running() {
        let (mut supervisor, _rx, _dir) = make_supervisor();
        let id = add_bash_bot(&mut supervisor, "sleep 30");

        supervisor.launch(&id).await.unwrap();

        let entry = supervisor.registry.get(&id).unwrap().unwrap();
        assert!(entry.process.is_running());
        let bot = supervisor.store.get(&id).unwrap();
        assert!(bot.running);
        assert!(bot.started_at.is_some());
        assert_eq!(bot.uptime_seconds, 0);

        supervisor.stop(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_double_launch_is_rejected() {
        let (mut supervisor, _rx, _dir) = make_supervisor();
        let id = add_bash_bot(&mut supervisor, "sleep 30");

        supervisor.launch(&id).await.unwrap();
        let second = supervisor.launch(&id).await;
        assert!(matches!(second, Err(SupervisorError::AlreadyRunning(_))));
        assert_eq!(supervisor.registry.len().unwrap(), 1);

        supervisor.stop(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_via_process_not_found() {
        let (mut supervisor, _rx, _dir) = make_supervisor();
        let id = add_bash_bot(&mut supervisor, "sleep 30");

        supervisor.launch(&id).await.unwrap();
        supervisor.stop(&id).await.unwrap();

        assert!(!supervisor.store.get(&id).unwrap().running);
        assert!(!supervisor.registry.contains(&id).unwrap());

        let second = supervisor.stop(&id).await;
        assert!(matches!(second, Err(SupervisorError::ProcessNotFound(_))));
    }

    #[tokio::test]
    async fn test_reconcile_corrects_simulated_death() {
        let (mut supervisor, _rx, _dir) = make_supervisor();
        let id = add_bash_bot(&mut supervisor, "sleep 30");

        // Persisted running with no registry entry — the daemon-restart
        // shape of state divergence.
        supervisor.store.get_mut(&id).unwrap().running = true;
        supervisor.store.save().unwrap();

        supervisor.reconcile().await.unwrap();

        assert!(!supervisor.store.get(&id).unwrap().running);
        assert!(!supervisor.registry.contains(&id).unwrap());
    }

    #[tokio::test]
    async fn test_reconcile_updates_uptime_for_live_process() {
        let (mut supervisor, _rx, _dir) = make_supervisor();
        let id = add_bash_bot(&mut supervisor, "sleep 30");

        supervisor.launch(&id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        supervisor.reconcile().await.unwrap();

        let bot = supervisor.store.get(&id).unwrap();
        assert!(bot.running);
        assert!(bot.uptime_seconds >= 1);

        supervisor.stop(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_compile_failure_aborts_launch() {
        let (mut supervisor, _rx, _dir) = make_supervisor();
        let bot = Bot::new("javabot", Language::Java, "this is not java", CRED);
        let id = bot.id.clone();
        supervisor.store.add(bot).unwrap();

        let result = supervisor.launch(&id).await;
        assert!(matches!(result, Err(SupervisorError::CompileFailed(_))));
        assert!(!supervisor.registry.contains(&id).unwrap());
        assert!(!supervisor.store.get(&id).unwrap().running);
    }

    #[tokio::test]
    async fn test_launch_unknown_bot() {
        let (mut supervisor, _rx, _dir) = make_supervisor();
        let result = supervisor.launch("ghost").await;
        assert!(matches!(result, Err(SupervisorError::BotNotFound(_))));
    }

    #[tokio::test]
    async fn test_exit_event_clears_state() {
        let (mut supervisor, mut rx, _dir) = make_supervisor();
        let id = add_bash_bot(&mut supervisor, "exit 0");

        supervisor.launch(&id).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.bot_id(), id);

        supervisor.handle_event(event);
        assert!(!supervisor.registry.contains(&id).unwrap());
        assert!(!supervisor.store.get(&id).unwrap().running);
    }

    #[tokio::test]
    async fn test_exit_event_after_stop_is_noop() {
        let (mut supervisor, mut rx, _dir) = make_supervisor();
        let id = add_bash_bot(&mut supervisor, "sleep 30");

        supervisor.launch(&id).await.unwrap();
        supervisor.stop(&id).await.unwrap();

        // SIGTERM from stop makes the exit observer fire; applying the
        // event after the entry is gone must not error.
        let event = rx.recv().await.unwrap();
        supervisor.handle_event(event);
        assert!(!supervisor.store.get(&id).unwrap().running);
    }

    #[tokio::test]
    async fn test_working_file_contains_injected_credential() {
        let (mut supervisor, _rx, _dir) = make_supervisor();
        let bot = Bot::new("pybot", Language::Python, "TOKEN = 'x'\nimport time\ntime.sleep(30)", CRED);
        let id = bot.id.clone();
        supervisor.store.add(bot).unwrap();

        // Launch may fail if no python binary exists; the working file is
        // written before the spawn either way.
        let _ = supervisor.launch(&id).await;

        let work_file = supervisor.working_dir().join(format!("bot_{}.py", id));
        let written = std::fs::read_to_string(&work_file).unwrap();
        assert!(written.contains(&format!("TOKEN = '{}'", CRED)));

        let _ = supervisor.stop(&id).await;
    }
}
