//! Bot process — direct subordinate process spawning with stdio capture.
//!
//! Output streams are forwarded line-by-line to the logging layer; the
//! supervisor never buffers them. Lifecycle transitions are published as
//! [`ProcessEvent`] messages to the supervisor's event loop rather than
//! mutating state from arbitrary call stacks.

use anyhow::Result;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::{mpsc, watch};

/// Lifecycle notification from a subordinate process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// The process terminated, with its exit code when the OS reported one.
    Exited { bot_id: String, code: Option<i32> },
    /// The process could not be awaited or crashed at the OS level.
    Errored { bot_id: String, reason: String },
}

impl ProcessEvent {
    pub fn bot_id(&self) -> &str {
        match self {
            ProcessEvent::Exited { bot_id, .. } => bot_id,
            ProcessEvent::Errored { bot_id, .. } => bot_id,
        }
    }
}

/// A subordinate bot process owned by the supervisor.
pub struct BotProcess {
    pub pid: u32,
    running_rx: watch::Receiver<bool>,
}

impl BotProcess {
    /// Spawn the run command for a bot.
    ///
    /// Returns as soon as the process has started; the exit/error observers
    /// stay attached for its entire lifetime and publish exactly one
    /// [`ProcessEvent`] on `event_tx` when it ends.
    pub async fn spawn(
        bot_id: &str,
        bot_name: &str,
        program: &str,
        args: &[String],
        working_dir: &Path,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self> {
        let mut cmd = TokioCommand::new(program);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(false);

        crate::utils::apply_creation_flags(&mut cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn process '{}': {}", program, e))?;

        let pid = child
            .id()
            .ok_or_else(|| anyhow::anyhow!("Failed to get PID of spawned process"))?;

        let (running_tx, running_rx) = watch::channel(true);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // ── stdout reader ────────────────────────────────────
        if let Some(stdout) = stdout {
            let name = bot_name.to_string();
            let id = bot_id.to_string();
            tokio::spawn(async move {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::info!("Bot '{}' ({}) stdout: {}", name, id, line);
                }
            });
        }

        // ── stderr reader ────────────────────────────────────
        if let Some(stderr) = stderr {
            let name = bot_name.to_string();
            let id = bot_id.to_string();
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!("Bot '{}' ({}) stderr: {}", name, id, line);
                }
            });
        }

        // ── process waiter ───────────────────────────────────
        {
            let id = bot_id.to_string();
            let name = bot_name.to_string();
            tokio::spawn(async move {
                let event = match child.wait().await {
                    Ok(status) => {
                        tracing::info!("Bot '{}' ({}) exited with {}", name, id, status);
                        ProcessEvent::Exited {
                            bot_id: id,
                            code: status.code(),
                        }
                    }
                    Err(e) => {
                        tracing::error!("Bot '{}' ({}) process error: {}", name, id, e);
                        ProcessEvent::Errored {
                            bot_id: id,
                            reason: e.to_string(),
                        }
                    }
                };
                let _ = running_tx.send(false);
                let _ = event_tx.send(event).await;
            });
        }

        tracing::info!("Bot '{}' ({}) started with PID {}", bot_name, bot_id, pid);

        Ok(Self { pid, running_rx })
    }

    /// Whether the process is still running, per the exit observer.
    pub fn is_running(&self) -> bool {
        *self.running_rx.borrow()
    }

    /// Request graceful termination so the subordinate can close its own
    /// external connections. Not a forceful kill.
    pub fn terminate(&self) -> Result<()> {
        tracing::info!("Sending TERM to PID {}", self.pid);

        #[cfg(windows)]
        {
            use winapi::um::handleapi::CloseHandle;
            use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
            use winapi::um::winnt::PROCESS_TERMINATE;

            unsafe {
                let handle = OpenProcess(PROCESS_TERMINATE, 0, self.pid);
                if handle.is_null() {
                    return Err(anyhow::anyhow!("Failed to open process {}", self.pid));
                }
                let result = TerminateProcess(handle, 0);
                CloseHandle(handle);
                if result == 0 {
                    return Err(anyhow::anyhow!("TerminateProcess failed for {}", self.pid));
                }
            }
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM)
                .map_err(|e| anyhow::anyhow!("Failed to send SIGTERM to {}: {}", self.pid, e))?;
        }

        Ok(())
    }
}
