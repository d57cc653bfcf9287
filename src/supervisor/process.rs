use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("no tracked process for '{key}'")]
    NotTracked { key: String },
    #[error("failed to terminate process {pid}: {reason}")]
    TerminationFailed { pid: u32, reason: String },
    #[error("lock poisoned")]
    LockPoisoned,
}

/// Terminate one specific PID. (크로스 플랫폼)
///
/// Only ever called with a PID we spawned and tracked ourselves. Termination
/// by executable name is deliberately not offered anywhere in this crate:
/// it can take down unrelated processes that happen to share the name.
pub fn terminate_pid(pid: u32, force: bool) -> Result<(), ProcessError> {
    #[cfg(target_os = "windows")]
    {
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
        use winapi::um::winnt::PROCESS_TERMINATE;

        // Windows에는 graceful 시그널이 없으므로 force 여부와 무관하게
        // TerminateProcess를 사용한다. graceful 종료는 콘솔 stop 명령 경로 담당.
        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
            if handle.is_null() {
                return Err(ProcessError::TerminationFailed {
                    pid,
                    reason: format!("failed to open process {}", pid),
                });
            }

            let exit_code = if force { 1 } else { 0 };
            let result = TerminateProcess(handle, exit_code);
            CloseHandle(handle);

            if result == 0 {
                return Err(ProcessError::TerminationFailed {
                    pid,
                    reason: "TerminateProcess failed".to_string(),
                });
            }
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), signal) {
            return Err(ProcessError::TerminationFailed {
                pid,
                reason: format!("failed to send signal: {}", e),
            });
        }
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub start_time: u64,
    pub last_check: u64,
}

/// PID bookkeeping for launched server processes, keyed by the canonical
/// working-directory string. Lifecycle state lives in the supervisor's state
/// machine; this only remembers which PID belongs to which server directory.
pub struct ProcessTracker {
    processes: Mutex<HashMap<String, ProcessInfo>>,
}

impl Default for ProcessTracker {
    fn default() -> Self {
        Self {
            processes: Mutex::new(HashMap::new()),
        }
    }
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutex 락 획득 헬퍼 (보일러플레이트 제거)
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, ProcessInfo>>, ProcessError> {
        self.processes.lock().map_err(|e| {
            tracing::error!("ProcessTracker lock poisoned: {}", e);
            ProcessError::LockPoisoned
        })
    }

    /// Track a newly launched process under its working-directory key.
    /// Re-tracking an existing key overwrites the entry (restart case).
    pub fn track(&self, key: &str, pid: u32) -> Result<(), ProcessError> {
        let now = current_timestamp();
        let info = ProcessInfo {
            pid,
            start_time: now,
            last_check: now,
        };
        let mut processes = self.lock()?;
        processes.insert(key.to_string(), info);
        tracing::info!("Now tracking server at '{}' with pid {}", key, pid);
        Ok(())
    }

    pub fn get_pid(&self, key: &str) -> Result<u32, ProcessError> {
        let processes = self.lock()?;
        processes
            .get(key)
            .map(|p| p.pid)
            .ok_or_else(|| ProcessError::NotTracked { key: key.to_string() })
    }

    pub fn get_start_time(&self, key: &str) -> Result<u64, ProcessError> {
        let processes = self.lock()?;
        processes
            .get(key)
            .map(|p| p.start_time)
            .ok_or_else(|| ProcessError::NotTracked { key: key.to_string() })
    }

    /// Record a liveness-poll pass over this entry.
    pub fn record_check(&self, key: &str) -> Result<(), ProcessError> {
        let mut processes = self.lock()?;
        if let Some(info) = processes.get_mut(key) {
            info.last_check = current_timestamp();
        }
        Ok(())
    }

    /// Terminate the tracked process for this key. The entry stays tracked
    /// until the exit is confirmed and `untrack` is called.
    pub fn terminate(&self, key: &str, force: bool) -> Result<(), ProcessError> {
        let pid = self.get_pid(key)?;
        let signal_name = if force { "KILL" } else { "TERM" };
        tracing::info!(
            "Sending {} to server at '{}' (pid {})",
            signal_name,
            key,
            pid
        );
        terminate_pid(pid, force)
    }

    pub fn untrack(&self, key: &str) -> Result<(), ProcessError> {
        let mut processes = self.lock()?;
        processes
            .remove(key)
            .ok_or_else(|| ProcessError::NotTracked { key: key.to_string() })?;
        tracing::info!("Stopped tracking server at '{}'", key);
        Ok(())
    }

    /// Snapshot of all tracked entries, for the reconcile sweep.
    pub fn snapshot(&self) -> Result<Vec<(String, ProcessInfo)>, ProcessError> {
        let processes = self.lock()?;
        Ok(processes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
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

    #[test]
    fn test_track_and_get_pid() {
        let tracker = ProcessTracker::new();
        tracker.track("/srv/minecraft", 1234).unwrap();
        assert_eq!(tracker.get_pid("/srv/minecraft").unwrap(), 1234);
    }

    #[test]
    fn test_not_tracked() {
        let tracker = ProcessTracker::new();
        assert!(tracker.get_pid("/srv/nonexistent").is_err());
        assert!(tracker.get_start_time("/srv/nonexistent").is_err());
    }

    #[test]
    fn test_untrack() {
        let tracker = ProcessTracker::new();
        tracker.track("/srv/minecraft", 1234).unwrap();
        tracker.untrack("/srv/minecraft").unwrap();
        assert!(tracker.get_pid("/srv/minecraft").is_err());
    }

    #[test]
    fn test_untrack_nonexistent_returns_error() {
        let tracker = ProcessTracker::new();
        assert!(tracker.untrack("/never/existed").is_err());
    }

    #[test]
    fn test_terminate_unknown_key() {
        let tracker = ProcessTracker::new();
        assert!(tracker.terminate("/srv/ghost", false).is_err());
    }

    #[test]
    fn test_start_time_is_nonzero() {
        let tracker = ProcessTracker::new();
        tracker.track("/srv/mc", 1234).unwrap();
        let start_time = tracker.get_start_time("/srv/mc").unwrap();
        assert!(start_time > 0, "expected a Unix timestamp, got {}", start_time);
    }

    #[test]
    fn test_track_overwrites_existing() {
        let tracker = ProcessTracker::new();
        tracker.track("/srv/mc", 1000).unwrap();
        assert_eq!(tracker.get_pid("/srv/mc").unwrap(), 1000);

        // 같은 디렉터리로 재등록하면 새 PID로 교체 (재시작 케이스)
        tracker.track("/srv/mc", 2000).unwrap();
        assert_eq!(tracker.get_pid("/srv/mc").unwrap(), 2000);
    }

    #[test]
    fn test_record_check_updates_last_check() {
        let tracker = ProcessTracker::new();
        tracker.track("/srv/mc", 42).unwrap();
        tracker.record_check("/srv/mc").unwrap();
        let snap = tracker.snapshot().unwrap();
        assert_eq!(snap.len(), 1);
        assert!(snap[0].1.last_check >= snap[0].1.start_time);
    }

    #[test]
    fn test_record_check_unknown_is_noop() {
        let tracker = ProcessTracker::new();
        assert!(tracker.record_check("/srv/ghost").is_ok());
    }

    #[test]
    fn test_multiple_directories_independent() {
        let tracker = ProcessTracker::new();
        tracker.track("/srv/mc", 100).unwrap();
        tracker.track("/srv/valheim", 200).unwrap();

        assert_eq!(tracker.get_pid("/srv/mc").unwrap(), 100);
        assert_eq!(tracker.get_pid("/srv/valheim").unwrap(), 200);

        // 하나만 삭제해도 나머지는 영향 없음
        tracker.untrack("/srv/mc").unwrap();
        assert!(tracker.get_pid("/srv/mc").is_err());
        assert_eq!(tracker.get_pid("/srv/valheim").unwrap(), 200);
    }

    #[test]
    fn test_snapshot_lists_all() {
        let tracker = ProcessTracker::new();
        tracker.track("/a", 1).unwrap();
        tracker.track("/b", 2).unwrap();
        let mut keys: Vec<String> = tracker
            .snapshot()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["/a".to_string(), "/b".to_string()]);
    }
}
