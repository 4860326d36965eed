//! Managed script process — direct spawning with stdio relay
//!
//! Every started script is wrapped here:
//! - byte-level stdout/stderr capture with encoding fallback and line buffering
//! - stdin injection for the interactive console
//! - severity tagging via a configurable regex
//! - exit observation through a running-state watch channel

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::{broadcast, mpsc, watch, Mutex};

use crate::utils::{current_timestamp, decode_console_bytes};

/// Fallback ring capacity when settings carry nothing useful.
const DEFAULT_LOG_BUFFER: usize = 10_000;

// ─── Console line types ──────────────────────────────────────

/// A single line of console output from a managed script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    /// Sequential ID for polling (`GET /console?since=<id>`)
    pub id: u64,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    /// Where the line came from
    pub source: LogSource,
    /// Decoded text content
    pub content: String,
    /// Parsed severity level
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Stdout,
    Stderr,
    /// System messages from the daemon itself
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

// ─── Console ring buffer ─────────────────────────────────────

/// Ring buffer storing recent console lines with sequential IDs.
/// 콘솔 뷰가 닫혀 있어도 계속 쌓이고, 다시 열면 히스토리로 보입니다.
struct LogBuffer {
    lines: VecDeque<LogLine>,
    next_id: u64,
    max_size: usize,
}

impl LogBuffer {
    fn with_capacity(max_size: usize) -> Self {
        let max_size = if max_size == 0 { DEFAULT_LOG_BUFFER } else { max_size };
        Self {
            lines: VecDeque::with_capacity(max_size.min(1024)),
            next_id: 0,
            max_size,
        }
    }

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
        self.lines
            .iter()
            .filter(|l| l.id > since_id)
            .cloned()
            .collect()
    }

    /// Get the most recent `count` lines.
    fn get_recent(&self, count: usize) -> Vec<LogLine> {
        self.lines.iter().rev().take(count).rev().cloned().collect()
    }
}

// ─── Managed script ──────────────────────────────────────────

/// A script process spawned and relayed by the daemon.
///
/// Provides:
/// - console input via `send_input()`
/// - buffered console output via `console_since()` / `recent_console()`
/// - real-time broadcast via `subscribe()`
/// - exit observation via `is_running()` / `wait_for_exit()`
pub struct ManagedScript {
    stdin_tx: mpsc::Sender<String>,
    log_buffer: Arc<Mutex<LogBuffer>>,
    log_broadcast: broadcast::Sender<LogLine>,
    pub pid: u32,
    running_rx: watch::Receiver<bool>,
}

impl ManagedScript {
    /// Spawn `interpreter [args..] script_path` with piped stdio.
    ///
    /// `level_pattern` is an optional regex with a named capture group `level`
    /// matching severity keywords; lines that do not match default to Info,
    /// stderr lines are floored to Warn.
    pub async fn spawn(
        interpreter: &str,
        args: &[String],
        script_path: &str,
        level_pattern: Option<&str>,
        buffer_capacity: usize,
    ) -> Result<Self> {
        let mut cmd = TokioCommand::new(interpreter);
        cmd.args(args)
            .arg(script_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(false);

        // Windows: hide console window
        crate::utils::apply_creation_flags(&mut cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn '{}': {}", interpreter, e))?;

        let pid = child
            .id()
            .ok_or_else(|| anyhow::anyhow!("Failed to get PID of spawned process"))?;

        let (stdin_tx, stdin_rx) = mpsc::channel::<String>(256);
        let (log_tx, _) = broadcast::channel::<LogLine>(2048);
        let (running_tx, running_rx) = watch::channel(true);

        let log_buffer = Arc::new(Mutex::new(LogBuffer::with_capacity(buffer_capacity)));

        // Compile severity regex (shared across stdout/stderr readers)
        let level_regex = level_pattern.and_then(|pat| match Regex::new(pat) {
            Ok(re) => Some(Arc::new(re)),
            Err(e) => {
                tracing::warn!("Invalid level_pattern '{}': {}, severity tagging disabled", pat, e);
                None
            }
        });

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdin = child.stdin.take();

        // ── stdout reader ────────────────────────────────────
        if let Some(stdout) = stdout {
            spawn_stream_reader(
                stdout,
                LogSource::Stdout,
                log_buffer.clone(),
                log_tx.clone(),
                level_regex.clone(),
            );
        }

        // ── stderr reader ────────────────────────────────────
        if let Some(stderr) = stderr {
            spawn_stream_reader(
                stderr,
                LogSource::Stderr,
                log_buffer.clone(),
                log_tx.clone(),
                level_regex.clone(),
            );
        }

        // ── stdin writer ─────────────────────────────────────
        if let Some(mut stdin_handle) = stdin {
            let mut rx = stdin_rx;
            tokio::spawn(async move {
                while let Some(input) = rx.recv().await {
                    let data = if input.ends_with('\n') { input } else { format!("{}\n", input) };
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
            let msg = format!("Process started with PID {}", pid);
            let log_line = log_buffer.lock().await.push(LogSource::System, msg, LogLevel::Info);
            let _ = log_tx.send(log_line);
        }

        Ok(Self {
            stdin_tx,
            log_buffer,
            log_broadcast: log_tx,
            pid,
            running_rx,
        })
    }

    /// Send a line to the script's stdin.
    pub async fn send_input(&self, input: &str) -> Result<()> {
        self.stdin_tx
            .send(input.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("stdin channel closed: {}", e))
    }

    /// Get all console lines with `id > since_id`.
    pub async fn console_since(&self, since_id: u64) -> Vec<LogLine> {
        self.log_buffer.lock().await.get_since(since_id)
    }

    /// Get the most recent `count` console lines.
    pub async fn recent_console(&self, count: usize) -> Vec<LogLine> {
        self.log_buffer.lock().await.get_recent(count)
    }

    /// Subscribe to real-time console events.
    #[allow(dead_code)]
    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.log_broadcast.subscribe()
    }

    /// Whether the process is still running.
    pub fn is_running(&self) -> bool {
        *self.running_rx.borrow()
    }

    /// Wait until the process exits.
    pub async fn wait_for_exit(&self) {
        let mut rx = self.running_rx.clone();
        while *rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Reader task for one stdio stream. Reads raw bytes line by line so that a
/// script printing in a legacy codepage cannot kill the relay.
fn spawn_stream_reader<R>(
    stream: R,
    source: LogSource,
    buf: Arc<Mutex<LogBuffer>>,
    bc: broadcast::Sender<LogLine>,
    level_regex: Option<Arc<Regex>>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut raw = Vec::with_capacity(256);
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    while raw.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
                        raw.pop();
                    }
                    let content = decode_console_bytes(&raw);
                    let mut level = parse_log_level(&content, level_regex.as_deref());
                    if source == LogSource::Stderr && level == LogLevel::Info {
                        // stderr는 최소 Warn으로 표시
                        level = LogLevel::Warn;
                    }
                    let log_line = buf.lock().await.push(source, content, level);
                    let _ = bc.send(log_line);
                }
                Err(e) => {
                    tracing::debug!("Console stream read error: {}", e);
                    break;
                }
            }
        }
    });
}

// ─── Relay store ─────────────────────────────────────────────

/// Central store for all managed script processes. Thread-safe.
pub struct ScriptRelayStore {
    relays: Mutex<HashMap<String, Arc<ManagedScript>>>,
}

impl ScriptRelayStore {
    pub fn new() -> Self {
        Self {
            relays: Mutex::new(HashMap::new()),
        }
    }

    /// Register a relay under a script id.
    pub async fn insert(&self, script_id: &str, relay: ManagedScript) {
        let mut map = self.relays.lock().await;
        map.insert(script_id.to_string(), Arc::new(relay));
    }

    pub async fn get(&self, script_id: &str) -> Option<Arc<ManagedScript>> {
        let map = self.relays.lock().await;
        map.get(script_id).cloned()
    }

    /// Drop a relay. Exited relays stay registered until the script is
    /// stopped, restarted or removed so the console history remains readable.
    pub async fn remove(&self, script_id: &str) -> Option<Arc<ManagedScript>> {
        let mut map = self.relays.lock().await;
        map.remove(script_id)
    }
}

impl Default for ScriptRelayStore {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Helpers ─────────────────────────────────────────────────

/// Parse the severity of a console line using an optional regex pattern.
///
/// The pattern should contain a named capture group `level` matching keywords
/// such as INFO, WARNING, ERROR, DEBUG, CRITICAL. No pattern or no match
/// defaults to Info.
fn parse_log_level(line: &str, pattern: Option<&Regex>) -> LogLevel {
    if let Some(re) = pattern {
        if let Some(caps) = re.captures(line) {
            if let Some(level_match) = caps.name("level") {
                return match level_match.as_str().to_uppercase().as_str() {
                    "ERROR" | "CRITICAL" | "FATAL" => LogLevel::Error,
                    "WARN" | "WARNING" => LogLevel::Warn,
                    "DEBUG" | "TRACE" => LogLevel::Debug,
                    _ => LogLevel::Info,
                };
            }
        }
    }
    LogLevel::Info
}

// ─── Tests ───────────────────────────────────────────────────
