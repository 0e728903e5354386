use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use super::SettingsArgs;
use crate::settings::{EngineSettings, FeedbackSettings, Settings};

pub const DEFAULT_CONFIG_FILE: &str = "uicompare.yaml";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MAX_BODY: usize = 1024 * 1024;

/// Configuration loaded from `uicompare.yaml`.
/// Every field is optional; CLI flags and env vars take precedence.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub max_body: Option<usize>,
    pub engine: EngineConfig,
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Full launch command, e.g. `npx backstop`.
    pub command: Option<String>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FeedbackConfig {
    pub provider: Option<String>,
    pub anthropic_model: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `uicompare.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))
    }

    /// Merge with CLI/env values into the process settings.
    pub fn resolve(&self, args: &SettingsArgs) -> Result<Settings> {
        let data_dir = args
            .data_dir
            .clone()
            .or_else(|| self.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let engine_dir = args
            .engine_dir
            .clone()
            .or_else(|| self.engine.dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut settings = Settings::new(data_dir, engine_dir);

        if let Some(command) = args.engine_command.as_ref().or(self.engine.command.as_ref()) {
            apply_engine_command(&mut settings.engine, command)?;
        }

        let fb = &self.feedback;
        let defaults = FeedbackSettings::default();
        settings.feedback = FeedbackSettings {
            provider: args.llm_provider.clone().or_else(|| fb.provider.clone()),
            anthropic_api_key: non_empty(args.anthropic_api_key.clone()),
            anthropic_model: pick(&args.anthropic_model, &fb.anthropic_model, defaults.anthropic_model),
            anthropic_base_url: pick(
                &args.anthropic_base_url,
                &fb.anthropic_base_url,
                defaults.anthropic_base_url,
            ),
            openai_api_key: non_empty(args.openai_api_key.clone()),
            openai_model: pick(&args.openai_model, &fb.openai_model, defaults.openai_model),
            openai_base_url: pick(&args.openai_base_url, &fb.openai_base_url, defaults.openai_base_url),
            max_tokens: fb.max_tokens.unwrap_or(defaults.max_tokens),
            timeout: fb.timeout_secs.map(Duration::from_secs).unwrap_or(defaults.timeout),
        };

        Ok(settings)
    }

    pub fn host(&self, cli: Option<String>) -> String {
        cli.or_else(|| self.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string())
    }

    pub fn port(&self, cli: Option<u16>) -> u16 {
        cli.or(self.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn max_body(&self, cli: Option<usize>) -> usize {
        cli.or(self.max_body).unwrap_or(DEFAULT_MAX_BODY)
    }
}

fn apply_engine_command(engine: &mut EngineSettings, command: &str) -> Result<()> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("Engine command is empty"))?;
    engine.command = program;
    engine.args = parts.collect();
    Ok(())
}

fn pick(cli: &Option<String>, file: &Option<String>, default: String) -> String {
    cli.clone().or_else(|| file.clone()).unwrap_or(default)
}

/// Blank keys in `.env` files count as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
