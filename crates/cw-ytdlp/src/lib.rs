//! yt-dlp adapter.
//!
//! Drives the `yt-dlp` binary as a subprocess for both media download
//! ([`YtDlpFetcher`]) and profile listing ([`YtDlpListing`]). Callers bound
//! each call with a timeout; the child is killed when the call is dropped.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    sync::Arc,
};

use cw_core::{errors::Error, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
    sync::Mutex,
};

mod fetch;
mod listing;

pub use fetch::YtDlpFetcher;
pub use listing::YtDlpListing;

const STDERR_TAIL_MAX_BYTES: usize = 16 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 200;

#[derive(Clone, Debug)]
pub struct YtDlpConfig {
    pub binary: PathBuf,
    /// `-f` format selector.
    pub format: String,
    /// Parent directory for per-download scratch directories.
    pub media_dir: PathBuf,
    /// Passed as `--max-filesize` so oversized media fails fast.
    pub max_filesize: Option<u64>,
}

impl YtDlpConfig {
    pub fn from_config(cfg: &cw_core::config::Config) -> Self {
        Self {
            binary: cfg.ytdlp_path.clone(),
            format: cfg.ytdlp_format.clone(),
            media_dir: cfg.media_dir.clone(),
            max_filesize: Some(cfg.max_upload_bytes),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        // +1 for the '\n' we join with later.
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

struct RunOutput {
    status: ExitStatus,
    stdout: String,
    stderr_tail: String,
}

impl RunOutput {
    /// Human-readable failure description including the stderr tail.
    fn failure(&self, what: &str) -> String {
        let mut msg = format!("{what}: yt-dlp exited with status {}", self.status);
        if !self.stderr_tail.trim().is_empty() {
            msg.push_str("\nstderr (tail):\n");
            msg.push_str(&self.stderr_tail);
        }
        msg
    }
}

/// Spawn yt-dlp with `args` and collect stdout plus a bounded stderr tail.
async fn run_ytdlp(binary: &Path, args: &[String]) -> Result<RunOutput> {
    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(binary = %binary.display(), ?args, "spawning yt-dlp");
    let mut child = cmd
        .spawn()
        .map_err(|e| Error::External(format!("failed to spawn {}: {e}", binary.display())))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::External("yt-dlp stdout was not captured".to_string()))?;
    let stderr = child.stderr.take();
    let tail: Arc<Mutex<StderrTail>> = Arc::new(Mutex::new(StderrTail::default()));

    // Drain stderr in background to avoid blocking on a full pipe.
    let drain = stderr.map(|stderr| {
        let tail = tail.clone();
        tokio::spawn(async move {
            let mut r = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = r.next_line().await {
                tail.lock().await.push_line(line);
            }
        })
    });

    let mut out = String::new();
    BufReader::new(stdout).read_to_string(&mut out).await?;
    let status = child.wait().await?;
    if let Some(drain) = drain {
        let _ = drain.await;
    }

    let stderr_tail = tail.lock().await.snapshot();
    Ok(RunOutput {
        status,
        stdout: out,
        stderr_tail,
    })
}
