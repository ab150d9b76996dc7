//! Ollama lifecycle and model management over the `ollama` CLI.
//!
//! Lists and pulls models for the turn controller, and starts/stops a
//! `serve` process through an explicit handle.

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use shared::events::{PullOutcome, PullProgress};
use shared::model_api::{ModelRegistry, RegistryError};
use std::collections::BTreeSet;
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid ansi pattern"));

/// One row of `ollama list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalModel {
    pub name: String,
    pub id: String,
    /// Human-readable size, e.g. "1.6 GB".
    pub size: String,
    pub modified: String,
}

/// Parse `ollama list` output. The header row and any line mentioning a
/// failure are skipped.
pub fn parse_model_list(output: &str) -> Vec<LocalModel> {
    output
        .lines()
        .filter(|line| !line.contains("NAME") && !line.contains("failed"))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let name = parts.first()?;
            Some(LocalModel {
                name: name.to_string(),
                id: parts.get(1).map(|s| s.to_string()).unwrap_or_default(),
                size: parts.get(2..usize::min(4, parts.len())).map(|s| s.join(" ")).unwrap_or_default(),
                modified: parts.get(4..).map(|s| s.join(" ")).unwrap_or_default(),
            })
        })
        .collect()
}

/// Registry backed by the `ollama` binary.
#[derive(Debug, Clone)]
pub struct OllamaCli {
    binary: String,
}

impl OllamaCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, RegistryError> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| RegistryError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(RegistryError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Every locally available model with its listed details.
    pub fn list_models(&self) -> Result<Vec<LocalModel>, RegistryError> {
        let stdout = self.run(&["list"])?;
        Ok(parse_model_list(&stdout))
    }

    /// Raw `ollama show` output for a model.
    pub fn show_model(&self, model: &str) -> Result<String> {
        Ok(self.run(&["show", model])?)
    }
}

impl ModelRegistry for OllamaCli {
    fn list_available_models(&self) -> Result<BTreeSet<String>, RegistryError> {
        let models = self.list_models()?;
        debug!(count = models.len(), "listed local models");
        Ok(models.into_iter().map(|m| m.name).collect())
    }

    fn fetch_model(&self, model: &str, on_progress: &mut dyn FnMut(PullProgress)) -> PullOutcome {
        info!(model, "pulling model");
        let mut child = match Command::new(&self.binary)
            .args(["pull", model])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return PullOutcome::Failed {
                    reason: format!("could not run {}: {}", self.binary, e),
                }
            }
        };

        // Progress goes to stderr and status lines to stdout; read both and
        // deliver them on this thread in arrival order.
        let (tx, rx) = mpsc::channel::<String>();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            readers.push(thread::spawn(move || forward_lines(stdout, tx)));
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = tx.clone();
            readers.push(thread::spawn(move || forward_lines(stderr, tx)));
        }
        drop(tx);

        let mut size_mb = None;
        let mut percent = None;
        let mut last_line = String::new();
        for line in rx {
            let progress = PullProgress::parse(&line);
            size_mb = progress.size_mb.or(size_mb);
            percent = progress.percent.or(percent);
            last_line = progress.line.clone();
            on_progress(progress);
        }
        for reader in readers {
            let _ = reader.join();
        }

        match child.wait() {
            Ok(status) if status.success() => {
                info!(model, ?size_mb, ?percent, "pull completed");
                PullOutcome::Completed { size_mb, percent }
            }
            Ok(status) => {
                warn!(model, %status, "pull failed");
                PullOutcome::Failed {
                    reason: if last_line.is_empty() {
                        format!("ollama pull exited with {}", status)
                    } else {
                        last_line
                    },
                }
            }
            Err(e) => PullOutcome::Failed {
                reason: format!("could not wait for ollama pull: {}", e),
            },
        }
    }
}

/// Split a byte stream on `\n` or `\r` (the CLI redraws progress in place)
/// and send every non-empty, ANSI-stripped segment.
fn forward_lines<R: Read>(mut reader: R, tx: mpsc::Sender<String>) {
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                if !send_segment(&mut pending, &tx) {
                    return;
                }
            } else {
                pending.push(byte);
            }
        }
    }
    send_segment(&mut pending, &tx);
}

fn send_segment(pending: &mut Vec<u8>, tx: &mpsc::Sender<String>) -> bool {
    let raw = String::from_utf8_lossy(pending).to_string();
    pending.clear();
    let cleaned = ANSI_RE.replace_all(&raw, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return true;
    }
    tx.send(cleaned.to_string()).is_ok()
}

// ── Server lifecycle ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub binary: String,
    pub port: u16,
    pub use_gpu: bool,
}

/// A running `ollama serve` started by [`OllamaServer::start`].
#[derive(Debug)]
pub struct ServerHandle {
    child: Child,
    port: u16,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

pub struct OllamaServer;

impl OllamaServer {
    /// Spawn `ollama serve` and wait until its port accepts connections.
    pub fn start(options: &ServerOptions) -> Result<ServerHandle> {
        let mut child = Command::new(&options.binary)
            .arg("serve")
            .env("OLLAMA_HOST", format!("127.0.0.1:{}", options.port))
            .env("OLLAMA_DEVICE", if options.use_gpu { "gpu" } else { "cpu" })
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| anyhow!("Failed to start Ollama: {}", e))?;

        if wait_for_ollama(options.port, 8) {
            info!(port = options.port, pid = child.id(), "ollama server started");
            return Ok(ServerHandle {
                child,
                port: options.port,
            });
        }

        let _ = child.kill();
        let _ = child.wait();
        Err(anyhow!(
            "Ollama started but didn't become reachable on port {} within 8 seconds",
            options.port
        ))
    }

    /// Terminate a server started by [`OllamaServer::start`] and reap it.
    pub fn stop(mut handle: ServerHandle) -> Result<()> {
        info!(port = handle.port, "closing ollama server");
        match handle.child.try_wait()? {
            Some(status) => debug!(%status, "ollama server had already exited"),
            None => {
                handle.child.kill()?;
                handle.child.wait()?;
            }
        }
        info!("ollama server closed");
        Ok(())
    }
}

/// Check if something is listening on the Ollama port.
pub fn is_reachable(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_ok()
}

/// Poll until Ollama is reachable or timeout (in seconds).
fn wait_for_ollama(port: u16, timeout_secs: u32) -> bool {
    for _ in 0..(timeout_secs * 4) {
        if is_reachable(port) {
            return true;
        }
        thread::sleep(Duration::from_millis(250));
    }
    false
}
