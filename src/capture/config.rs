use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::run::error::ValidationError;
use crate::run::types::Viewport;
use crate::run::workspace::Workspace;

/// Test id and scenario label. Together with the viewport they fix the file
/// names the engine produces.
pub const TEST_ID: &str = "ui_comparison";
pub const SCENARIO_LABEL: &str = "UI Comparison";

// Capture policy. Identical for every run so results stay comparable.
const MISMATCH_THRESHOLD: f64 = 0.1;
const POST_LOAD_DELAY_MS: u64 = 5000;
const ASYNC_CAPTURE_LIMIT: u32 = 5;
const ASYNC_COMPARE_LIMIT: u32 = 50;
const ENGINE: &str = "puppeteer";
const BROWSER_ARGS: &[&str] = &["--no-sandbox"];
/// Puppeteer hooks, relative to the engine scripts root.
pub const ON_BEFORE_SCRIPT: &str = "puppet/onBefore.js";
pub const ON_READY_SCRIPT: &str = "puppet/onReady.js";
/// Cookies loaded by the before-hook, e.g. an exported login session.
pub const COOKIES_FILE: &str = "cookies.json";

/// Configuration document read by the capture engine (BackstopJS schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    pub id: String,
    pub viewports: Vec<ViewportSpec>,
    pub scenarios: Vec<Scenario>,
    pub paths: OutputPaths,
    pub report: Vec<String>,
    pub open_report: bool,
    pub on_before_script: String,
    pub on_ready_script: String,
    pub engine: String,
    pub engine_options: EngineOptions,
    pub async_capture_limit: u32,
    pub async_compare_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportSpec {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub label: String,
    pub url: String,
    pub reference_url: String,
    pub cookie_path: String,
    pub delay: u64,
    pub selectors: Vec<String>,
    pub mis_match_threshold: f64,
    pub require_same_dimensions: bool,
}

/// Output roots. Field names are the engine's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPaths {
    pub bitmaps_reference: String,
    pub bitmaps_test: String,
    pub engine_scripts: String,
    pub html_report: String,
    pub ci_report: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub args: Vec<String>,
}

fn required(value: Option<&str>, name: &'static str) -> Result<String, ValidationError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ValidationError::MissingUrl(name))
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl CaptureConfig {
    /// Build the engine configuration for one run. All output paths point
    /// into `workspace`; `engine_scripts` is the only shared (read-only) root.
    pub fn build(
        reference_url: Option<&str>,
        test_url: Option<&str>,
        viewport: Viewport,
        workspace: &Workspace,
        engine_scripts: &Path,
    ) -> Result<Self, ValidationError> {
        let reference_url = required(reference_url, "referenceUrl")?;
        let test_url = required(test_url, "testUrl")?;
        let (width, height) = viewport.dimensions();

        Ok(Self {
            id: TEST_ID.to_string(),
            viewports: vec![ViewportSpec {
                label: viewport.label().to_string(),
                width,
                height,
            }],
            scenarios: vec![Scenario {
                label: SCENARIO_LABEL.to_string(),
                url: test_url,
                reference_url,
                cookie_path: path_str(&engine_scripts.join(COOKIES_FILE)),
                delay: POST_LOAD_DELAY_MS,
                selectors: Vec::new(),
                mis_match_threshold: MISMATCH_THRESHOLD,
                require_same_dimensions: true,
            }],
            paths: OutputPaths {
                bitmaps_reference: path_str(&workspace.reference_root),
                bitmaps_test: path_str(&workspace.test_root),
                engine_scripts: path_str(engine_scripts),
                html_report: path_str(&workspace.report_root),
                ci_report: path_str(&workspace.ci_report_root),
            },
            report: vec!["browser".to_string()],
            open_report: false,
            on_before_script: ON_BEFORE_SCRIPT.to_string(),
            on_ready_script: ON_READY_SCRIPT.to_string(),
            engine: ENGINE.to_string(),
            engine_options: EngineOptions {
                args: BROWSER_ARGS.iter().map(|a| a.to_string()).collect(),
            },
            async_capture_limit: ASYNC_CAPTURE_LIMIT,
            async_compare_limit: ASYNC_COMPARE_LIMIT,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// File name the engine gives the single capture of a run.
pub fn capture_file_name(viewport: Viewport) -> String {
    let sanitize = |s: &str| s.replace(' ', "_");
    format!(
        "{}_{}_0_document_0_{}.png",
        sanitize(TEST_ID),
        sanitize(SCENARIO_LABEL),
        viewport.label()
    )
}
