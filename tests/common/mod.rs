//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use uicompare::capture::config::capture_file_name;
use uicompare::capture::{CaptureConfig, CaptureEngine, CaptureGateway, CaptureMode, EngineError};
use uicompare::feedback::{FeedbackProvider, ProviderError};
use uicompare::run::RunOrchestrator;
use uicompare::run::types::Viewport;
use uicompare::settings::Settings;

pub const REFERENCE_PNG: &[u8] = b"\x89PNG reference";
pub const TEST_PNG: &[u8] = b"\x89PNG test";
pub const REPORT_PAGE: &str =
    "<html><head><title>Report</title></head><body><div id=\"root\"></div></body></html>";
/// Directory name the stub engine gives its test captures.
pub const TEST_STAMP: &str = "20260101-120000";

/// How the stub engine answers one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Pass,
    Mismatch,
    Fail(&'static str),
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub mode: CaptureMode,
    pub test_url: String,
    pub viewport: String,
}

/// What the stub engine saw, shared with the test.
#[derive(Default)]
pub struct EngineLog {
    pub calls: Mutex<Vec<Invocation>>,
    pub overlaps: AtomicUsize,
    busy: AtomicBool,
}

impl EngineLog {
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

/// Engine that reads the shared config like BackstopJS does and writes the
/// files BackstopJS would write, without a browser.
pub struct StubEngine {
    log: Arc<EngineLog>,
    reference: Reply,
    test: Reply,
    delay: Duration,
    extra_test_dir: bool,
    write_test_image: bool,
    write_report: bool,
}

impl StubEngine {
    pub fn new(reference: Reply, test: Reply) -> (Self, Arc<EngineLog>) {
        let log = Arc::new(EngineLog::default());
        let engine = Self {
            log: log.clone(),
            reference,
            test,
            delay: Duration::ZERO,
            extra_test_dir: false,
            write_test_image: true,
            write_report: true,
        };
        (engine, log)
    }

    pub fn passing() -> (Self, Arc<EngineLog>) {
        Self::new(Reply::Pass, Reply::Pass)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Leave a second capture directory under the test root.
    pub fn with_extra_test_dir(mut self) -> Self {
        self.extra_test_dir = true;
        self
    }

    /// Create the test capture directory but no image in it.
    pub fn without_test_image(mut self) -> Self {
        self.write_test_image = false;
        self
    }

    /// Skip writing the HTML report entry page.
    pub fn without_report(mut self) -> Self {
        self.write_report = false;
        self
    }

    async fn run(&self, mode: CaptureMode, config_file: &Path) -> Result<(), EngineError> {
        let failed = |message: String| EngineError::Failed { mode, message };

        let raw = tokio::fs::read_to_string(config_file)
            .await
            .map_err(|e| failed(format!("cannot read config: {}", e)))?;
        let config: CaptureConfig =
            serde_json::from_str(&raw).map_err(|e| failed(format!("bad config: {}", e)))?;

        let viewport_label = config.viewports[0].label.clone();
        self.log.calls.lock().unwrap().push(Invocation {
            mode,
            test_url: config.scenarios[0].url.clone(),
            viewport: viewport_label.clone(),
        });

        tokio::time::sleep(self.delay).await;

        let viewport = Viewport::from_key(&viewport_label).ok_or_else(|| failed("bad viewport".into()))?;
        let file_name = capture_file_name(viewport);
        let reply = match mode {
            CaptureMode::Reference => {
                let dir = PathBuf::from(&config.paths.bitmaps_reference);
                write(&dir, &file_name, REFERENCE_PNG).await;
                self.reference
            }
            CaptureMode::Test => {
                let root = PathBuf::from(&config.paths.bitmaps_test);
                let dir = root.join(TEST_STAMP);
                if self.write_test_image {
                    write(&dir, &file_name, TEST_PNG).await;
                } else {
                    tokio::fs::create_dir_all(&dir).await.unwrap();
                }
                if self.extra_test_dir {
                    write(&root.join("20260101-120500"), &file_name, TEST_PNG).await;
                }
                if self.write_report {
                    let report = PathBuf::from(&config.paths.html_report);
                    write(&report, "index.html", REPORT_PAGE.as_bytes()).await;
                }
                self.test
            }
        };

        match reply {
            Reply::Pass => Ok(()),
            Reply::Mismatch => Err(failed(
                "Command failed with exit code 1\nMismatch errors found.".into(),
            )),
            Reply::Fail(message) => Err(failed(message.to_string())),
        }
    }
}

async fn write(dir: &Path, name: &str, data: &[u8]) {
    tokio::fs::create_dir_all(dir).await.unwrap();
    tokio::fs::write(dir.join(name), data).await.unwrap();
}

#[async_trait]
impl CaptureEngine for StubEngine {
    fn name(&self) -> &str {
        "stub"
    }

    async fn invoke(&self, mode: CaptureMode, config_file: &Path) -> Result<(), EngineError> {
        if self.log.busy.swap(true, Ordering::SeqCst) {
            self.log.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let result = self.run(mode, config_file).await;
        self.log.busy.store(false, Ordering::SeqCst);
        result
    }
}

/// Provider returning a fixed answer, or failing like an API error.
pub struct StubProvider {
    reply: Option<String>,
    pub images: Mutex<Vec<Vec<u8>>>,
}

impl StubProvider {
    pub fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.to_string()),
            images: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            images: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl FeedbackProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn feedback(&self, image_png: &[u8]) -> Result<String, ProviderError> {
        self.images.lock().unwrap().push(image_png.to_vec());
        self.reply.clone().ok_or(ProviderError::Status {
            provider: "stub",
            status: 500,
            body: "overloaded".to_string(),
        })
    }
}

pub fn settings(root: &Path) -> Arc<Settings> {
    Arc::new(Settings::new(root.join("data"), root.join("engine")))
}

pub fn orchestrator(
    root: &Path,
    engine: StubEngine,
    provider: Option<Arc<dyn FeedbackProvider>>,
) -> RunOrchestrator {
    let settings = settings(root);
    let gateway = CaptureGateway::new(Box::new(engine), &settings.engine.config_file);
    RunOrchestrator::new(settings, gateway, provider)
}
