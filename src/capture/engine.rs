use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::settings::EngineSettings;

/// The two operations the capture engine exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Reference,
    Test,
}

impl CaptureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureMode::Reference => "reference",
            CaptureMode::Test => "test",
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to write engine config {}: {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize engine config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to launch capture engine '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture engine {mode} failed: {message}")]
    Failed { mode: CaptureMode, message: String },

    #[error("Capture task ended abnormally: {0}")]
    Aborted(String),
}

/// An external screenshot-and-diff tool.
///
/// Implementations read their configuration from `config_file`; they take no
/// other per-invocation input.
#[async_trait]
pub trait CaptureEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Run `mode` to completion. A failure reported by the tool itself is
    /// returned as [`EngineError::Failed`] with the tool's message.
    async fn invoke(&self, mode: CaptureMode, config_file: &Path) -> Result<(), EngineError>;
}

/// BackstopJS driven through its command line.
pub struct BackstopEngine {
    settings: EngineSettings,
}

impl BackstopEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }
}

const MISMATCH_MARKER: &str = "mismatch errors found";
const MESSAGE_TAIL_LINES: usize = 20;

/// Whether an engine failure message reports differences rather than a
/// broken environment.
pub fn is_mismatch(message: &str) -> bool {
    message.to_ascii_lowercase().contains(MISMATCH_MARKER)
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

fn failure_message(code: Option<i32>, stdout: &str, stderr: &str) -> String {
    let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
    if let Some(line) = stdout
        .lines()
        .chain(stderr.lines())
        .find(|l| is_mismatch(l))
    {
        return format!("{} (exit {})", line.trim(), code);
    }
    format!(
        "exit {}\n{}\n{}",
        code,
        tail(stderr, MESSAGE_TAIL_LINES),
        tail(stdout, MESSAGE_TAIL_LINES)
    )
    .trim_end()
    .to_string()
}

#[async_trait]
impl CaptureEngine for BackstopEngine {
    fn name(&self) -> &str {
        "backstop"
    }

    async fn invoke(&self, mode: CaptureMode, config_file: &Path) -> Result<(), EngineError> {
        let mut command = tokio::process::Command::new(&self.settings.command);
        command
            .args(&self.settings.args)
            .arg(mode.as_str())
            .arg(format!("--config={}", config_file.display()))
            .current_dir(&self.settings.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(mode = %mode, command = %self.settings.command, "Launching capture engine");

        let spawn_err = |source| EngineError::Spawn {
            command: self.settings.command.clone(),
            source,
        };
        let child = command.spawn().map_err(spawn_err)?;

        let output = child.wait_with_output().await.map_err(spawn_err)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(mode = %mode, stdout = %tail(&stdout, MESSAGE_TAIL_LINES), "Capture engine output");

        if output.status.success() {
            return Ok(());
        }

        Err(EngineError::Failed {
            mode,
            message: failure_message(output.status.code(), &stdout, &stderr),
        })
    }
}
