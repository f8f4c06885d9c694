use std::env;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command as ProcessCommand, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

const NO_DEADLINE_TIMEOUT_MS: u64 = u64::MAX;
const HOOK_STREAM_CAP_BYTES: usize = 1024 * 1024;
const HOOK_POLL_SLEEP_MS: u64 = 10;

// ── Environment ─────────────────────────────────────────────────────

pub(crate) fn env_required(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    let value = env::var(name).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("Missing {name}")).into());
    }
    Ok(value)
}

pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn jitter_ratio() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

pub(crate) fn parse_retry_after(resp: &ureq::Response) -> Option<f64> {
    resp.header("retry-after")
        .and_then(|v| v.trim().parse::<f64>().ok())
}

/// Exponential backoff with up to 20% jitter, never shorter than `retry_after`.
pub(crate) fn backoff_delay(attempt: usize, base: f64, max: f64, retry_after: Option<f64>) -> Duration {
    let mut delay = (base * 2.0_f64.powi(attempt as i32)).min(max);
    if let Some(retry_after) = retry_after {
        delay = delay.max(retry_after);
    }
    delay *= 1.0 + jitter_ratio() * 0.2;
    Duration::from_secs_f64(delay.max(0.0))
}

// ── Small helpers ───────────────────────────────────────────────────

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

/// Write via a sibling tmp file and rename so readers never see a torn file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

// ── External commands ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum CommandSpec {
    String(String),
    Array(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct HookSpec {
    pub(crate) command: CommandSpec,
    #[serde(default)]
    pub(crate) timeout_ms: Option<u64>,
}

pub(crate) fn command_spec_to_vec(spec: &CommandSpec) -> Vec<String> {
    match spec {
        CommandSpec::Array(items) => items.clone(),
        CommandSpec::String(cmd) => {
            if cfg!(windows) {
                vec!["cmd".to_string(), "/C".to_string(), cmd.clone()]
            } else {
                vec!["sh".to_string(), "-c".to_string(), cmd.clone()]
            }
        }
    }
}

fn spawn_capture<R: Read + Send + 'static>(reader: R) -> thread::JoinHandle<(Vec<u8>, bool)> {
    thread::spawn(move || {
        let mut captured: Vec<u8> = Vec::new();
        let mut truncated = false;
        let mut buffer = [0_u8; 4096];
        let mut reader = reader;
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    let remaining = HOOK_STREAM_CAP_BYTES.saturating_sub(captured.len());
                    let take = remaining.min(n);
                    captured.extend_from_slice(&buffer[..take]);
                    if n > take {
                        truncated = true;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        (captured, truncated)
    })
}

/// Run `command` with `input` as JSON on stdin and return trimmed stdout.
pub(crate) fn run_hook_command(
    command: &[String],
    input: &serde_json::Value,
    timeout_ms: u64,
    kind: &str,
) -> Result<String, String> {
    if command.is_empty() {
        return Err("hook command is empty".into());
    }
    let mut cmd = ProcessCommand::new(&command[0]);
    cmd.args(&command[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env("DESKMATE_HOOK", kind);

    let mut child = cmd.spawn().map_err(|e| format!("spawn failed: {e}"))?;
    let stdout_handle = child.stdout.take().map(spawn_capture);
    let stderr_handle = child.stderr.take().map(spawn_capture);
    if let Some(mut stdin) = child.stdin.take() {
        let payload = serde_json::to_vec(input).map_err(|e| format!("encode input: {e}"))?;
        // A hook that exits without reading stdin closes the pipe; that is its business.
        let _ = stdin.write_all(&payload).and_then(|_| stdin.flush());
    }

    let timeout = if timeout_ms == NO_DEADLINE_TIMEOUT_MS {
        None
    } else {
        Some(Duration::from_millis(timeout_ms.max(1)))
    };
    let start = Instant::now();
    let mut timed_out = false;
    let status = loop {
        if let Some(timeout) = timeout {
            if start.elapsed() >= timeout {
                timed_out = true;
                let _ = child.kill();
                break child.wait().map_err(|e| format!("hook wait failed: {e}"));
            }
        }
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => thread::sleep(Duration::from_millis(HOOK_POLL_SLEEP_MS)),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                break Err(format!("hook wait failed: {e}"));
            }
        }
    };

    let collect = |handle: Option<thread::JoinHandle<(Vec<u8>, bool)>>| -> (Vec<u8>, bool) {
        handle
            .and_then(|join| join.join().ok())
            .unwrap_or_else(|| (Vec::new(), false))
    };
    let (stdout, stdout_truncated) = collect(stdout_handle);
    let (stderr, _) = collect(stderr_handle);

    if timed_out {
        return Err(format!("hook '{kind}' timed out after {timeout_ms}ms"));
    }
    let status = status?;
    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
        if stderr.is_empty() {
            return Err(format!("hook exited with {status}"));
        }
        return Err(format!("hook error: {stderr}"));
    }
    if stdout_truncated {
        return Err("hook output exceeded capture limit".into());
    }
    let stdout = String::from_utf8_lossy(&stdout).trim().to_string();
    if stdout.is_empty() {
        return Err("hook returned empty output".into());
    }
    Ok(stdout)
}
