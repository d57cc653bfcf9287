//! Managed process - direct server process spawning with stdio capture
//!
//! The supervisor owns exactly one managed process per server directory:
//! - Real-time stdout/stderr capture into a bounded log ring buffer
//! - stdin command injection (server console commands)
//! - Configurable log level parsing via a `level` named-capture regex
//! - Exit tracking through a watch channel fed by a dedicated waiter task

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use uuid::Uuid;

/// Default maximum number of log lines kept in the ring buffer.
/// Overridable via `log_buffer_size` in config/mcwarden.toml.
const DEFAULT_LOG_BUFFER: usize = 10_000;

// ─── Log Types ───────────────────────────────────────────────

/// A single line of console output from the managed server process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    /// Sequential ID for polling (`console --since <id>`)
    pub id: u64,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    /// Where the line came from
    pub source: LogSource,
    /// Raw text content
    pub content: String,
    /// Parsed severity level
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Stdout,
    Stderr,
    /// System messages from the warden itself
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

// ─── Log Buffer ──────────────────────────────────────────────

/// Ring buffer that stores recent log lines with sequential IDs.
struct LogBuffer {
    lines: VecDeque<LogLine>,
    next_id: u64,
    max_size: usize,
}

impl LogBuffer {
    fn with_capacity(max_size: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_size),
            next_id: 0,
            max_size,
        }
    }

    /// Push a new log line and return the created `LogLine`.
    fn push(&mut self, source: LogSource, content: String, level: LogLevel) -> LogLine {
        let line = LogLine {
            id: self.next_id,
            timestamp: current_timestamp(),
            source,
            content,
            level,
        };
        self.next_id += 1;

        if self.lines.len() >= self.max_size {
            self.lines.pop_front();
        }
        self.lines.push_back(line.clone());
        line
    }

    /// Get all lines with id > `since_id` (for polling).
    fn get_since(&self, since_id: u64) -> Vec<LogLine> {
        self.lines.iter().filter(|l| l.id > since_id).cloned().collect()
    }

    /// Get the most recent `count` lines.
    fn get_recent(&self, count: usize) -> Vec<LogLine> {
        self.lines.iter().rev().take(count).rev().cloned().collect()
    }
}

// ─── Launch Spec ─────────────────────────────────────────────

/// Everything needed to spawn a server process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Executable to run (e.g. `"java"`)
    pub program: String,
    /// Command-line arguments (e.g. `["-Xmx2G", "-jar", "server.jar", "nogui"]`)
    pub args: Vec<String>,
    /// Server working directory (also the tracking key after canonicalization)
    pub working_dir: PathBuf,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Optional regex with a named capture group `level` (INFO, WARN, ...)
    /// applied to each console line. `None` classifies everything as Info.
    pub log_pattern: Option<String>,
    /// Ring buffer size for console capture
    pub log_buffer_size: usize,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
            env: Vec::new(),
            log_pattern: None,
            log_buffer_size: DEFAULT_LOG_BUFFER,
        }
    }
}

// ─── Managed Process ─────────────────────────────────────────

/// A server process spawned and owned by the supervisor.
///
/// Provides:
/// - Async stdin command injection via `send_command()`
/// - Buffered console output via `get_console_since()` / `get_recent_console()`
/// - Real-time log broadcast via `subscribe()`
/// - Exit observation via `is_running()` / `wait_for_exit()`
pub struct ManagedProcess {
    /// Channel to send commands to stdin
    stdin_tx: mpsc::Sender<String>,
    /// Log buffer for recent console output
    log_buffer: Arc<Mutex<LogBuffer>>,
    /// Broadcast channel for real-time log events
    log_broadcast: broadcast::Sender<LogLine>,
    /// Process PID
    pub pid: u32,
    /// Per-launch session identity; a restart gets a fresh ID
    pub session_id: Uuid,
    /// Watch channel flipped to `false` by the waiter task on real exit
    running_rx: watch::Receiver<bool>,
}

impl ManagedProcess {
    /// Spawn a new managed server process.
    ///
    /// The child is detached from the daemon's lifetime (`kill_on_drop(false)`):
    /// dropping the handle never kills a server the operator started.
    pub async fn spawn(spec: &LaunchSpec) -> Result<Self> {
        let mut cmd = TokioCommand::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(false);

        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        // Windows: hide console window
        crate::utils::apply_creation_flags(&mut cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn process '{}': {}", spec.program, e))?;

        let pid = child
            .id()
            .ok_or_else(|| anyhow::anyhow!("Failed to get PID of spawned process"))?;
        let session_id = Uuid::new_v4();

        // Channels
        let (stdin_tx, stdin_rx) = mpsc::channel::<String>(256);
        let (log_tx, _) = broadcast::channel::<LogLine>(2048);
        let (running_tx, running_rx) = watch::channel(true);

        let log_buffer = Arc::new(Mutex::new(LogBuffer::with_capacity(spec.log_buffer_size)));

        // Compile log pattern regex (shared across stdout/stderr readers)
        let log_regex = spec.log_pattern.as_deref().and_then(|pat| match Regex::new(pat) {
            Ok(re) => Some(Arc::new(re)),
            Err(e) => {
                tracing::warn!("Invalid log_pattern '{}': {}, falling back to default", pat, e);
                None
            }
        });

        // Take ownership of stdio handles
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdin = child.stdin.take();

        // ── stdout reader ────────────────────────────────────
        if let Some(stdout) = stdout {
            let buf = log_buffer.clone();
            let bc = log_tx.clone();
            let re = log_regex.clone();
            tokio::spawn(async move {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let level = parse_log_level(&line, re.as_deref());
                    let log_line = buf.lock().await.push(LogSource::Stdout, line, level);
                    let _ = bc.send(log_line);
                }
            });
        }

        // ── stderr reader ────────────────────────────────────
        if let Some(stderr) = stderr {
            let buf = log_buffer.clone();
            let bc = log_tx.clone();
            let re = log_regex.clone();
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let level = parse_log_level(&line, re.as_deref());
                    // stderr lines default to at least Warn
                    let effective = if level == LogLevel::Info { LogLevel::Warn } else { level };
                    let log_line = buf.lock().await.push(LogSource::Stderr, line, effective);
                    let _ = bc.send(log_line);
                }
            });
        }

        // ── stdin writer ─────────────────────────────────────
        if let Some(mut stdin_handle) = stdin {
            let mut rx = stdin_rx;
            tokio::spawn(async move {
                while let Some(cmd) = rx.recv().await {
                    let data = if cmd.ends_with('\n') { cmd } else { format!("{}\n", cmd) };
                    if stdin_handle.write_all(data.as_bytes()).await.is_err() {
                        break;
                    }
                    if stdin_handle.flush().await.is_err() {
                        break;
                    }
                }
            });
        }

        // ── process waiter ───────────────────────────────────
        {
            let buf = log_buffer.clone();
            let bc = log_tx.clone();
            tokio::spawn(async move {
                let exit_msg = match child.wait().await {
                    Ok(status) => format!("Process exited with {}", status),
                    Err(e) => format!("Failed to wait for process: {}", e),
                };
                tracing::info!("{}", exit_msg);
                let log_line = buf.lock().await.push(LogSource::System, exit_msg, LogLevel::Info);
                let _ = bc.send(log_line);
                let _ = running_tx.send(false);
            });
        }

        // System log entry
        {
            let msg = format!("Process started with PID {} (session {})", pid, session_id);
            let log_line = log_buffer.lock().await.push(LogSource::System, msg, LogLevel::Info);
            let _ = log_tx.send(log_line);
        }

        Ok(Self {
            stdin_tx,
            log_buffer,
            log_broadcast: log_tx,
            pid,
            session_id,
            running_rx,
        })
    }

    /// Send a command string to the server console (stdin).
    pub async fn send_command(&self, command: &str) -> Result<()> {
        self.stdin_tx
            .send(command.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("stdin channel closed: {}", e))
    }

    /// Get all log lines with `id > since_id`.
    pub async fn get_console_since(&self, since_id: u64) -> Vec<LogLine> {
        self.log_buffer.lock().await.get_since(since_id)
    }

    /// Get the most recent `count` log lines.
    pub async fn get_recent_console(&self, count: usize) -> Vec<LogLine> {
        self.log_buffer.lock().await.get_recent(count)
    }

    /// Subscribe to real-time log events.
    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.log_broadcast.subscribe()
    }

    /// Whether the process is still running, per the waiter task.
    pub fn is_running(&self) -> bool {
        *self.running_rx.borrow()
    }

    /// Wait until the process exits. Each caller gets its own receiver, so
    /// this works through a shared `Arc<ManagedProcess>`.
    pub async fn wait_for_exit(&self) {
        let mut rx = self.running_rx.clone();
        while *rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

// ─── Managed Process Store ───────────────────────────────────

/// Central store for managed processes, keyed by server directory. Thread-safe.
pub struct ManagedProcessStore {
    processes: Mutex<HashMap<String, Arc<ManagedProcess>>>,
}

impl ManagedProcessStore {
    pub fn new() -> Self {
        Self {
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Register a managed process under its server directory key.
    pub async fn insert(&self, key: &str, process: ManagedProcess) {
        let mut map = self.processes.lock().await;
        map.insert(key.to_string(), Arc::new(process));
    }

    /// Get a managed process by server directory key.
    pub async fn get(&self, key: &str) -> Option<Arc<ManagedProcess>> {
        let map = self.processes.lock().await;
        map.get(key).cloned()
    }

    /// Remove a managed process (e.g. after its exit is confirmed).
    pub async fn remove(&self, key: &str) -> Option<Arc<ManagedProcess>> {
        let mut map = self.processes.lock().await;
        map.remove(key)
    }

    /// 현재 실행 중인 서버 디렉터리 키 목록 반환
    pub async fn running_keys(&self) -> Vec<String> {
        let map = self.processes.lock().await;
        map.iter()
            .filter(|(_, proc)| proc.is_running())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Clean up processes that are no longer running.
    pub async fn cleanup_dead(&self) {
        let mut map = self.processes.lock().await;
        map.retain(|key, proc| {
            if !proc.is_running() {
                tracing::info!("Cleaning up dead managed process for '{}'", key);
                false
            } else {
                true
            }
        });
    }
}

impl Default for ManagedProcessStore {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Helpers ─────────────────────────────────────────────────

/// Parse the log level from a server console line using an optional regex.
///
/// The pattern should contain a named capture group `level` matching level
/// keywords (INFO, WARN, ERROR, DEBUG, ...). Without a pattern, or without a
/// match, the line is classified Info.
///
/// Example patterns:
///   Minecraft: `/(?P<level>INFO|WARN|ERROR|DEBUG|FATAL)\]`
///   Generic:   `(?P<level>INFO|WARN|ERROR|DEBUG|TRACE|FATAL)`
fn parse_log_level(line: &str, pattern: Option<&Regex>) -> LogLevel {
    if let Some(re) = pattern {
        if let Some(caps) = re.captures(line) {
            if let Some(level_match) = caps.name("level") {
                return match level_match.as_str().to_uppercase().as_str() {
                    "ERROR" | "FATAL" => LogLevel::Error,
                    "WARN" | "WARNING" => LogLevel::Warn,
                    "DEBUG" | "TRACE" => LogLevel::Debug,
                    _ => LogLevel::Info,
                };
            }
        }
    }
    LogLevel::Info
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ─── Tests ───────────────────────────────────────────────────
