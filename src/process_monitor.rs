//! Liveness probing for subordinate processes.
//!
//! The reconciler only depends on the `is_alive(pid)` capability; how it is
//! answered is platform-specific. On unix the canonical zero-cost probe is a
//! no-op signal (signal 0) — delivery failure means the process is gone. On
//! Windows we fall back to a process-table lookup.

/// Whether a process with the given PID is currently alive.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;

    // Passing None sends no signal but still performs the existence and
    // permission checks.
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(windows)]
pub fn is_alive(pid: u32) -> bool {
    use sysinfo::{Pid, System};

    let mut sys = System::new();
    sys.refresh_processes();
    sys.process(Pid::from_u32(pid)).is_some()
}

/// Async wrapper. The Windows probe scans the OS process table
/// synchronously, so it runs on the blocking thread pool.
pub async fn is_alive_async(pid: u32) -> bool {
    tokio::task::spawn_blocking(move || is_alive(pid))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn test_bogus_pid_is_dead() {
        // PIDs near the signed 32-bit limit are not in use on any sane system.
        assert!(!is_alive(i32::MAX as u32 - 1));
    }

    #[tokio::test]
    async fn test_async_wrapper() {
        assert!(is_alive_async(std::process::id()).await);
    }
}
