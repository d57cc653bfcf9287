pub mod error;
pub mod managed_process;
pub mod process;
pub mod state_machine;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use uuid::Uuid;

pub use error::SupervisorError;
pub use managed_process::{LaunchSpec, LogLine, ManagedProcess, ManagedProcessStore};
use process::{ProcessError, ProcessTracker};
pub use state_machine::{ServerState, StateMachine};

/// Runtime knobs for the supervisor, sourced from config/mcwarden.toml.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// How long a spawned process must stay alive before it counts as Running
    pub probe_window: Duration,
    /// How long the graceful rung of the stop ladder waits before force-kill
    pub stop_grace: Duration,
    /// Console command sent as the most graceful stop (e.g. "stop"),
    /// used when the stdin plumbing is still alive
    pub console_stop_command: Option<String>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            probe_window: Duration::from_millis(1500),
            stop_grace: Duration::from_secs(10),
            console_stop_command: Some("stop".to_string()),
        }
    }
}

/// Handle returned by a successful `start`.
#[derive(Debug, Clone, Serialize)]
pub struct StartedServer {
    pub key: String,
    pub pid: u32,
    pub session_id: Uuid,
}

/// Point-in-time status snapshot for one server directory.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub key: String,
    pub state: ServerState,
    pub pid: Option<u32>,
    pub session_id: Option<Uuid>,
    pub uptime_secs: Option<u64>,
}

/// Process lifecycle supervisor.
///
/// One server per working directory. `start`/`stop` are single-flight per
/// directory: a per-key async mutex serializes control operations, so the
/// state machine never races. `status` reads the last reconciled state
/// without taking the flight guard.
pub struct Supervisor {
    options: SupervisorOptions,
    tracker: ProcessTracker,
    store: ManagedProcessStore,
    machines: TokioMutex<HashMap<String, StateMachine>>,
    flights: TokioMutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        Self {
            options,
            tracker: ProcessTracker::new(),
            store: ManagedProcessStore::new(),
            machines: TokioMutex::new(HashMap::new()),
            flights: TokioMutex::new(HashMap::new()),
        }
    }

    /// Canonical tracking key for a server working directory.
    pub fn canonical_key(workdir: &Path) -> String {
        match workdir.canonicalize() {
            Ok(p) => p.to_string_lossy().to_string(),
            Err(_) => workdir.to_string_lossy().to_string(),
        }
    }

    /// Per-directory single-flight guard (get or insert).
    async fn flight_guard(&self, key: &str) -> Arc<TokioMutex<()>> {
        let mut flights = self.flights.lock().await;
        flights
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    async fn get_state(&self, key: &str) -> ServerState {
        let machines = self.machines.lock().await;
        machines
            .get(key)
            .map(|m| m.state.clone())
            .unwrap_or(ServerState::Stopped)
    }

    async fn set_state(&self, key: &str, to: ServerState) -> Result<(), SupervisorError> {
        let mut machines = self.machines.lock().await;
        let machine = machines.entry(key.to_string()).or_insert_with(StateMachine::new);
        machine.transition(to)?;
        Ok(())
    }

    // ─── Start ───────────────────────────────────────────────

    /// Launch the server process described by `spec`.
    ///
    /// Transitions Stopped/Failed → Starting → Running. A process that dies
    /// inside the probe window yields `Failed` and a `LaunchFailed` error;
    /// its console tail stays readable for diagnosis until the next start.
    pub async fn start(&self, spec: &LaunchSpec) -> Result<StartedServer, SupervisorError> {
        if spec.program.trim().is_empty() {
            return Err(SupervisorError::InvalidConfig(
                "launch program is empty".to_string(),
            ));
        }

        let key = Self::canonical_key(&spec.working_dir);
        let guard = self.flight_guard(&key).await;
        let _flight = guard.lock().await;

        self.reconcile_key(&key).await?;

        let state = self.get_state(&key).await;
        if !state.can_launch() {
            return Err(SupervisorError::AlreadyRunning(key));
        }

        tracing::info!("[Supervisor] Starting server at '{}' ({})", key, spec.program);
        self.set_state(&key, ServerState::Starting).await?;

        let process = match ManagedProcess::spawn(spec).await {
            Ok(p) => p,
            Err(e) => {
                self.set_state(&key, ServerState::Failed).await?;
                return Err(SupervisorError::LaunchFailed(e.to_string()));
            }
        };

        let pid = process.pid;
        let session_id = process.session_id;
        self.tracker.track(&key, pid)?;
        self.store.insert(&key, process).await;

        // Confirmation probe: the process must survive the probe window
        // before we report Running.
        tokio::time::sleep(self.options.probe_window).await;

        let alive = match self.store.get(&key).await {
            Some(proc) => proc.is_running(),
            None => false,
        };

        if alive {
            self.set_state(&key, ServerState::Running).await?;
            tracing::info!(
                "[Supervisor] Server at '{}' is running (pid {}, session {})",
                key,
                pid,
                session_id
            );
            Ok(StartedServer { key, pid, session_id })
        } else {
            self.set_state(&key, ServerState::Failed).await?;
            let _ = self.tracker.untrack(&key);
            // Keep the store entry so the crash output stays readable.
            let tail = self.console_tail(&key, 3).await;
            tracing::error!("[Supervisor] Server at '{}' exited during startup probe", key);
            Err(SupervisorError::LaunchFailed(if tail.is_empty() {
                "process exited during startup probe".to_string()
            } else {
                format!("process exited during startup probe: {}", tail)
            }))
        }
    }

    /// Last few console lines, joined for an error message.
    async fn console_tail(&self, key: &str, count: usize) -> String {
        match self.store.get(key).await {
            Some(proc) => proc
                .get_recent_console(count)
                .await
                .into_iter()
                .map(|l| l.content)
                .collect::<Vec<_>>()
                .join("; "),
            None => String::new(),
        }
    }

    // ─── Stop ────────────────────────────────────────────────

    /// Stop the server in `workdir` using the stop ladder:
    /// console stop command (if plumbing is live) or graceful signal, a
    /// bounded wait on the exit watcher, then force-kill of the tracked PID.
    ///
    /// Idempotent: stopping an already stopped server is a no-op success.
    /// A known-failed server is cleared back to Stopped. A server that was
    /// believed Running but turns out dead reports `NotRunning` after
    /// reconciling to Failed.
    pub async fn stop(&self, workdir: &Path, force: bool) -> Result<ServerStatus, SupervisorError> {
        let key = Self::canonical_key(workdir);
        let guard = self.flight_guard(&key).await;
        let _flight = guard.lock().await;

        let prev_state = self.get_state(&key).await;
        self.reconcile_key(&key).await?;
        let state = self.get_state(&key).await;

        match state {
            ServerState::Stopped => {
                tracing::info!("[Supervisor] Stop requested but '{}' is already stopped", key);
                return self.status_snapshot(&key).await;
            }
            ServerState::Failed => {
                if prev_state == ServerState::Running {
                    // The caller believed it was running; the handle was stale.
                    return Err(SupervisorError::NotRunning(key));
                }
                // Acknowledge a known failure: clear back to Stopped.
                self.set_state(&key, ServerState::Stopped).await?;
                let _ = self.tracker.untrack(&key);
                self.store.remove(&key).await;
                tracing::info!("[Supervisor] Cleared failed state for '{}'", key);
                return self.status_snapshot(&key).await;
            }
            ServerState::Running => {
                self.set_state(&key, ServerState::Stopping).await?;
            }
            ServerState::Stopping => {
                // A previous stop did not finish (unkillable process or a
                // crashed ladder). Re-enter at the force rung.
                tracing::warn!("[Supervisor] '{}' already stopping, escalating", key);
            }
            ServerState::Starting => {
                // Unreachable under the flight guard; report rather than race.
                return Err(SupervisorError::Internal(anyhow::anyhow!(
                    "start in progress for '{}'",
                    key
                )));
            }
        }

        tracing::info!("[Supervisor] Stopping server at '{}' (force: {})", key, force);
        let proc = self.store.get(&key).await;

        // Graceful rung, skipped when the operator forces.
        if !force && state == ServerState::Running {
            let sent_console_stop = match (&self.options.console_stop_command, &proc) {
                (Some(cmd), Some(p)) if p.is_running() => p.send_command(cmd).await.is_ok(),
                _ => false,
            };
            if !sent_console_stop {
                // No live console; fall back to the platform signal.
                if let Err(e) = self.tracker.terminate(&key, false) {
                    tracing::warn!("[Supervisor] Graceful terminate failed for '{}': {}", key, e);
                }
            }
            if self.wait_for_exit(&key, &proc, self.options.stop_grace).await {
                return self.finish_stop(&key).await;
            }
            tracing::warn!(
                "[Supervisor] '{}' did not exit within {:?}, force-killing",
                key,
                self.options.stop_grace
            );
        }

        // Force rung: SIGKILL / TerminateProcess on the tracked PID only.
        match self.tracker.terminate(&key, true) {
            Ok(()) => {}
            Err(ProcessError::NotTracked { .. }) => {
                // Already gone between reconcile and now.
                return self.finish_stop(&key).await;
            }
            Err(e) => return Err(e.into()),
        }

        if self.wait_for_exit(&key, &proc, Duration::from_secs(5)).await {
            self.finish_stop(&key).await
        } else {
            // Kill confirmed sent but no exit observed. Leave Stopping; the
            // reconcile sweep completes the transition once the process dies.
            Err(SupervisorError::Process(ProcessError::TerminationFailed {
                pid: self.tracker.get_pid(&key).unwrap_or(0),
                reason: "process still alive after force kill".to_string(),
            }))
        }
    }

    /// Wait until the managed process exits, bounded by `dur`.
    /// Falls back to PID liveness polling when no console plumbing exists.
    async fn wait_for_exit(
        &self,
        key: &str,
        proc: &Option<Arc<ManagedProcess>>,
        dur: Duration,
    ) -> bool {
        match proc {
            Some(p) => tokio::time::timeout(dur, p.wait_for_exit()).await.is_ok(),
            None => {
                let pid = match self.tracker.get_pid(key) {
                    Ok(pid) => pid,
                    Err(_) => return true,
                };
                let deadline = tokio::time::Instant::now() + dur;
                loop {
                    if !crate::process_monitor::is_running_async(pid).await {
                        return true;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return false;
                    }
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            }
        }
    }

    async fn finish_stop(&self, key: &str) -> Result<ServerStatus, SupervisorError> {
        if self.get_state(key).await == ServerState::Stopping {
            self.set_state(key, ServerState::Stopped).await?;
        }
        let _ = self.tracker.untrack(key);
        self.store.remove(key).await;
        tracing::info!("[Supervisor] Server at '{}' stopped", key);
        self.status_snapshot(key).await
    }

    // ─── Status ──────────────────────────────────────────────

    /// Non-blocking status read. Never takes the flight guard; reports the
    /// last reconciled state. Unknown directories read as Stopped.
    pub async fn status(&self, workdir: &Path) -> Result<ServerStatus, SupervisorError> {
        let key = Self::canonical_key(workdir);
        self.status_snapshot(&key).await
    }

    async fn status_snapshot(&self, key: &str) -> Result<ServerStatus, SupervisorError> {
        let state = self.get_state(key).await;
        let pid = self.tracker.get_pid(key).ok();
        let session_id = self.store.get(key).await.map(|p| p.session_id);
        let uptime_secs = match (&state, self.tracker.get_start_time(key).ok()) {
            (ServerState::Running, Some(start)) => Some(now_epoch().saturating_sub(start)),
            _ => None,
        };
        Ok(ServerStatus {
            key: key.to_string(),
            state,
            pid,
            session_id,
            uptime_secs,
        })
    }

    // ─── Console ─────────────────────────────────────────────

    /// Send a command line to the server console.
    pub async fn send_command(&self, workdir: &Path, command: &str) -> Result<(), SupervisorError> {
        let key = Self::canonical_key(workdir);
        let proc = self
            .store
            .get(&key)
            .await
            .ok_or_else(|| SupervisorError::NoManagedProcess(key.clone()))?;
        proc.send_command(command).await?;
        Ok(())
    }

    /// Console lines with id > `since_id`, or the most recent `recent` lines
    /// when `since_id` is None. Works for a failed server too (crash tail).
    pub async fn get_console(
        &self,
        workdir: &Path,
        since_id: Option<u64>,
        recent: usize,
    ) -> Result<Vec<LogLine>, SupervisorError> {
        let key = Self::canonical_key(workdir);
        let proc = self
            .store
            .get(&key)
            .await
            .ok_or_else(|| SupervisorError::NoManagedProcess(key.clone()))?;
        Ok(match since_id {
            Some(id) => proc.get_console_since(id).await,
            None => proc.get_recent_console(recent).await,
        })
    }

    // ─── Reconciliation ──────────────────────────────────────

    /// 백그라운드 liveness 스윕 (주기적 실행). Tracked PID가 죽어 있으면
    /// 상태를 실제와 일치시킨다: Running이었으면 Failed, Stopping이었으면
    /// Stopped. 비행 중(start/stop 진행 중)인 키는 건너뛴다.
    pub async fn reconcile(&self) -> Result<(), SupervisorError> {
        let entries = self.tracker.snapshot()?;
        for (key, info) in entries {
            let guard = self.flight_guard(&key).await;
            let flight = match guard.try_lock() {
                Ok(g) => g,
                Err(_) => continue, // control operation in progress owns the truth
            };
            self.tracker.record_check(&key)?;
            if !crate::process_monitor::is_running_async(info.pid).await {
                self.reconcile_dead(&key).await?;
            }
            drop(flight);
        }
        Ok(())
    }

    /// Reconcile a single key while its flight guard is held by the caller.
    async fn reconcile_key(&self, key: &str) -> Result<(), SupervisorError> {
        let pid = match self.tracker.get_pid(key) {
            Ok(pid) => pid,
            Err(_) => {
                // Nothing tracked. A machine left in Running without a PID is
                // a stale handle and reads as Failed.
                if self.get_state(key).await == ServerState::Running {
                    self.set_state(key, ServerState::Failed).await?;
                }
                return Ok(());
            }
        };
        if !crate::process_monitor::is_running_async(pid).await {
            self.reconcile_dead(key).await?;
        }
        Ok(())
    }

    /// The tracked process for `key` is confirmed dead; update state.
    async fn reconcile_dead(&self, key: &str) -> Result<(), SupervisorError> {
        match self.get_state(key).await {
            ServerState::Running => {
                tracing::warn!(
                    "[Supervisor] Process for '{}' died without a stop request",
                    key
                );
                self.set_state(key, ServerState::Failed).await?;
                let _ = self.tracker.untrack(key);
                // Store entry kept: the crash tail stays readable.
            }
            ServerState::Stopping => {
                self.set_state(key, ServerState::Stopped).await?;
                let _ = self.tracker.untrack(key);
                self.store.remove(key).await;
                tracing::info!("[Supervisor] Confirmed exit for stopping server '{}'", key);
            }
            ServerState::Starting => {
                // The start call owns this window; its probe decides.
            }
            ServerState::Stopped | ServerState::Failed => {
                let _ = self.tracker.untrack(key);
            }
        }
        Ok(())
    }

    /// Keys of servers the store still believes are running, for the
    /// shutdown summary.
    pub async fn running_keys(&self) -> Vec<String> {
        self.store.running_keys().await
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
