use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process-wide configuration, resolved once at startup and shared by `Arc`.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of every run-scoped tree (bitmaps, reports, run records).
    pub data_dir: PathBuf,
    pub engine: EngineSettings,
    pub feedback: FeedbackSettings,
}

/// How the external capture engine is launched.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Executable, e.g. `npx`.
    pub command: String,
    /// Arguments placed before the mode, e.g. `["backstop"]`.
    pub args: Vec<String>,
    /// Working directory of the engine process.
    pub working_dir: PathBuf,
    /// The one configuration file the engine reads. Shared by all runs.
    pub config_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FeedbackSettings {
    /// Provider key (`anthropic`, `openai`, `none`). `None` selects the default.
    pub provider: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-7-sonnet-latest";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            provider: None,
            anthropic_api_key: None,
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            anthropic_base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            max_tokens: 4000,
            timeout: Duration::from_secs(120),
        }
    }
}

impl EngineSettings {
    /// `npx backstop` run from `working_dir`, reading `working_dir/backstop.json`.
    pub fn backstop(working_dir: impl AsRef<Path>) -> Self {
        let working_dir = absolutize(working_dir.as_ref());
        Self {
            command: "npx".to_string(),
            args: vec!["backstop".to_string()],
            config_file: working_dir.join("backstop.json"),
            working_dir,
        }
    }
}

impl Settings {
    /// Settings rooted at `data_dir` with the engine working in `engine_dir`
    /// and no feedback provider configured.
    pub fn new(data_dir: impl AsRef<Path>, engine_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: absolutize(data_dir.as_ref()),
            engine: EngineSettings::backstop(engine_dir),
            feedback: FeedbackSettings::default(),
        }
    }

    /// Engine helper scripts shared by every run (read-only for the engine).
    pub fn engine_scripts_dir(&self) -> PathBuf {
        self.data_dir.join("engine_scripts")
    }
}

/// Make a path absolute against the current directory without touching the
/// filesystem. The engine runs in its own working directory, so relative
/// output roots would resolve against the wrong base.
pub fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
