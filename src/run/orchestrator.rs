use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{Instrument, error, info, info_span, warn};

use crate::capture::config::CaptureConfig;
use crate::capture::engine::{BackstopEngine, CaptureMode, EngineError};
use crate::capture::gateway::{CaptureGateway, CaptureOutcome};
use crate::capture::locator::{self, Artifacts};
use crate::feedback::{self, FeedbackProvider};
use crate::report;
use crate::run::error::RunError;
use crate::run::record::{RunRecord, RunRecordStore};
use crate::run::types::*;
use crate::run::workspace::Workspace;
use crate::settings::Settings;

/// Progress reported by the capture task as it reaches each phase.
enum CaptureProgress {
    Reference,
    Test,
}

type CaptureResult = Result<CaptureOutcome, EngineError>;

/// Drives comparison runs from request to finished report.
///
/// Holds no per-run state: everything a finished run leaves behind is on
/// disk under its workspace and run record.
pub struct RunOrchestrator {
    settings: Arc<Settings>,
    gateway: CaptureGateway,
    provider: Option<Arc<dyn FeedbackProvider>>,
    records: RunRecordStore,
}

impl RunOrchestrator {
    pub fn new(
        settings: Arc<Settings>,
        gateway: CaptureGateway,
        provider: Option<Arc<dyn FeedbackProvider>>,
    ) -> Self {
        let records = RunRecordStore::new(&settings.data_dir);
        Self {
            settings,
            gateway,
            provider,
            records,
        }
    }

    /// BackstopJS engine and the configured feedback provider.
    pub fn from_settings(settings: Arc<Settings>) -> Self {
        let engine = BackstopEngine::new(settings.engine.clone());
        let gateway = CaptureGateway::new(Box::new(engine), &settings.engine.config_file);
        let provider = feedback::select_provider(&settings.feedback);
        Self::new(settings, gateway, provider)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn gateway(&self) -> &CaptureGateway {
        &self.gateway
    }

    pub fn records(&self) -> &RunRecordStore {
        &self.records
    }

    /// Run one comparison end to end.
    ///
    /// Only invalid input and capture failures are errors. Missing artifacts,
    /// provider failures and report augmentation failures are reported in the
    /// returned summary of a `Ready` run.
    pub async fn run_comparison(&self, request: ComparisonRequest) -> Result<RunSummary, RunError> {
        let viewport = Viewport::resolve(request.viewport_type.as_deref());
        let id = RunId::new();
        let workspace = Workspace::derive(&self.settings.data_dir, &id);
        let config = CaptureConfig::build(
            request.reference_url.as_deref(),
            request.test_url.as_deref(),
            viewport,
            &workspace,
            &self.settings.engine_scripts_dir(),
        )?;

        let scenario = &config.scenarios[0];
        let run = Run::new(
            id,
            scenario.reference_url.clone(),
            scenario.url.clone(),
            viewport,
            workspace,
        );
        info!(
            run_id = %id,
            reference_url = %run.reference_url,
            test_url = %run.test_url,
            viewport = %viewport,
            "Run created"
        );

        self.execute(run, config)
            .instrument(info_span!("run", run_id = %id))
            .await
    }

    async fn execute(&self, mut run: Run, config: CaptureConfig) -> Result<RunSummary, RunError> {
        save_config_copy(&run.workspace.config_file, &config).await;

        let outcome = match self.capture(&mut run, config).await? {
            Ok(CaptureOutcome::NoDifferences) => ComparisonOutcome::NoDifferences,
            Ok(CaptureOutcome::DifferencesFound) => ComparisonOutcome::DifferencesFound,
            Ok(CaptureOutcome::EngineFailure(message)) => {
                let source = EngineError::Failed {
                    mode: CaptureMode::Test,
                    message,
                };
                return Err(self.fail(run, source).await);
            }
            Err(source) => return Err(self.fail(run, source).await),
        };
        advance(&mut run, RunState::Comparing)?;
        info!(run_id = %run.id, outcome = %outcome, "Capture complete");

        let test_image = locator::locate_test(&run.id, run.viewport, &run.workspace).await;
        let reference_image = locator::locate_reference(run.viewport, &run.workspace).await;
        match (&test_image, &reference_image) {
            (Ok(test), Ok(reference)) => {
                let artifacts = Artifacts {
                    reference: reference.clone(),
                    test: test.clone(),
                };
                run.set_artifacts(artifacts)
                    .map_err(|source| RunError::Transition { run_id: run.id, source })?;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(run_id = %run.id, error = %e, "Could not resolve capture artifacts");
            }
        }

        advance(&mut run, RunState::FeedbackPending)?;
        let feedback = self.request_feedback(&mut run, test_image).await;

        let report_augmented = match run.feedback() {
            Some(text) => report::augment(&run.workspace.report_root, text).await,
            None => false,
        };

        advance(&mut run, RunState::Ready)?;
        info!(
            run_id = %run.id,
            outcome = %outcome,
            feedback_attached = feedback.is_attached(),
            report_augmented,
            "Run ready"
        );

        let summary = RunSummary {
            run_id: run.id,
            state: run.state(),
            viewport: run.viewport,
            outcome,
            feedback,
            report_augmented,
            artifacts: run.artifacts().cloned(),
        };
        self.save_record(&run, Some(&summary), None).await;
        Ok(summary)
    }

    /// Run both capture phases under one gateway session.
    ///
    /// The phases run in their own task: the engine process cannot be
    /// interrupted, and dropping the session while it runs would let the next
    /// run overwrite the shared config underneath it. The outer `Result` is a
    /// state machine error, the inner one the capture result.
    async fn capture(
        &self,
        run: &mut Run,
        config: CaptureConfig,
    ) -> Result<CaptureResult, RunError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gateway = self.gateway.clone();

        let task = tokio::spawn(
            async move {
                let mut session = gateway.session().await;
                let _ = tx.send(CaptureProgress::Reference);
                session.capture_reference(&config).await?;
                let _ = tx.send(CaptureProgress::Test);
                session.capture_test(&config).await
            }
            .in_current_span(),
        );

        while let Some(progress) = rx.recv().await {
            match progress {
                CaptureProgress::Reference => advance(run, RunState::CapturingReference)?,
                CaptureProgress::Test => advance(run, RunState::CapturingTest)?,
            }
        }

        Ok(match task.await {
            Ok(result) => result,
            Err(e) => Err(EngineError::Aborted(e.to_string())),
        })
    }

    async fn request_feedback(
        &self,
        run: &mut Run,
        test_image: Result<PathBuf, locator::ArtifactError>,
    ) -> FeedbackStatus {
        let path = match test_image {
            Ok(path) => path,
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Test image not found; skipping feedback");
                return FeedbackStatus::ArtifactMissing {
                    detail: e.to_string(),
                };
            }
        };

        let Some(provider) = &self.provider else {
            return FeedbackStatus::NotConfigured;
        };

        let image = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(run_id = %run.id, path = %path.display(), error = %e, "Could not read test image; skipping feedback");
                return FeedbackStatus::ArtifactMissing {
                    detail: format!("{}: {}", path.display(), e),
                };
            }
        };

        match provider.feedback(&image).await {
            Ok(text) => {
                info!(run_id = %run.id, provider = provider.name(), chars = text.len(), "Received feedback");
                run.set_feedback(text);
                FeedbackStatus::Attached {
                    provider: provider.name().to_string(),
                }
            }
            Err(e) => {
                error!(run_id = %run.id, provider = provider.name(), error = %e, "Feedback generation failed");
                FeedbackStatus::ProviderFailed {
                    provider: provider.name().to_string(),
                    detail: e.to_string(),
                }
            }
        }
    }

    async fn fail(&self, mut run: Run, source: EngineError) -> RunError {
        error!(run_id = %run.id, state = %run.state(), error = %source, "Run failed");
        if let Err(e) = advance(&mut run, RunState::Failed) {
            return e;
        }
        self.save_record(&run, None, Some(source.to_string())).await;
        RunError::Engine {
            run_id: run.id,
            source,
        }
    }

    async fn save_record(&self, run: &Run, summary: Option<&RunSummary>, error: Option<String>) {
        let record = RunRecord {
            id: run.id,
            reference_url: run.reference_url.clone(),
            test_url: run.test_url.clone(),
            viewport: run.viewport,
            state: run.state(),
            outcome: summary.map(|s| s.outcome),
            feedback: summary.map(|s| s.feedback.clone()),
            report_augmented: summary.is_some_and(|s| s.report_augmented),
            error,
            started: run.started,
            finished: Utc::now(),
        };
        if let Err(e) = self.records.save(&record).await {
            warn!(run_id = %run.id, error = %format!("{:#}", e), "Failed to save run record");
        }
    }
}

fn advance(run: &mut Run, next: RunState) -> Result<(), RunError> {
    let from = run.state();
    run.advance(next)
        .map_err(|source| RunError::Transition { run_id: run.id, source })?;
    info!(run_id = %run.id, from = %from, to = %next, "Run state changed");
    Ok(())
}

/// Keep the run's own copy of its engine config next to its outputs.
async fn save_config_copy(path: &std::path::Path, config: &CaptureConfig) {
    let result = async {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = config.to_json().map_err(std::io::Error::other)?;
        tokio::fs::write(path, data).await
    }
    .await;

    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "Failed to save run config copy");
    }
}
