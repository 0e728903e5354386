use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::capture::locator::Artifacts;
use crate::run::error::{TransitionError, ValidationError};
use crate::run::workspace::Workspace;

/// Identifier of one comparison run.
///
/// Backed by a UUID v7: the leading bits are the creation time in
/// milliseconds and the rest is a per-process monotonic counter plus random
/// data, so ids sort by creation order and never repeat within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse an id received from outside (URL path, CLI argument).
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let id = Uuid::try_parse(s).map_err(|_| ValidationError::InvalidRunId(s.to_string()))?;
        if id.get_version_num() != 7 {
            return Err(ValidationError::InvalidRunId(s.to_string()));
        }
        Ok(Self(id))
    }

    /// Creation time embedded in the id.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.0
            .get_timestamp()
            .and_then(|ts| {
                let (secs, nanos) = ts.to_unix();
                DateTime::from_timestamp(secs as i64, nanos)
            })
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// `YYYYMMDD-HHMMSS` stamp used as the reference capture directory.
    pub fn capture_stamp(&self) -> String {
        self.created_at().format("%Y%m%d-%H%M%S").to_string()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Screen sizes a comparison can be captured at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Viewport {
    Desktop,
    Laptop,
    Tablet,
    Mobile,
    MobileSmall,
}

impl Viewport {
    pub const ALL: [Viewport; 5] = [
        Viewport::Desktop,
        Viewport::Laptop,
        Viewport::Tablet,
        Viewport::Mobile,
        Viewport::MobileSmall,
    ];

    /// Key accepted from callers; also the engine's viewport label.
    pub fn label(self) -> &'static str {
        match self {
            Viewport::Desktop => "desktop",
            Viewport::Laptop => "laptop",
            Viewport::Tablet => "tablet",
            Viewport::Mobile => "mobile",
            Viewport::MobileSmall => "mobileSmall",
        }
    }

    /// `(width, height)` in CSS pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Viewport::Desktop => (1280, 800),
            Viewport::Laptop => (1024, 768),
            Viewport::Tablet => (768, 1024),
            Viewport::Mobile => (375, 667),
            Viewport::MobileSmall => (320, 568),
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.label() == key)
    }

    /// Resolve a caller-supplied key, falling back to desktop.
    pub fn resolve(key: Option<&str>) -> Self {
        match key.map(str::trim).filter(|k| !k.is_empty()) {
            None => Viewport::Desktop,
            Some(k) => Self::from_key(k).unwrap_or_else(|| {
                warn!(viewport = %k, "Unknown viewport, falling back to desktop");
                Viewport::Desktop
            }),
        }
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle state of a run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    CapturingReference,
    CapturingTest,
    Comparing,
    FeedbackPending,
    Ready,
    Failed,
}

impl RunState {
    fn rank(self) -> u8 {
        match self {
            RunState::Created => 0,
            RunState::CapturingReference => 1,
            RunState::CapturingTest => 2,
            RunState::Comparing => 3,
            RunState::FeedbackPending => 4,
            RunState::Ready | RunState::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Ready | RunState::Failed)
    }

    /// Whether `self -> next` is an edge of the run state machine.
    pub fn can_advance_to(self, next: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            // Only capture can fail a run; `Created` covers a capture task
            // that died before it got the engine. Feedback never fails a run.
            RunState::Failed => matches!(
                self,
                RunState::Created | RunState::CapturingReference | RunState::CapturingTest
            ),
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Created => write!(f, "created"),
            RunState::CapturingReference => write!(f, "capturing_reference"),
            RunState::CapturingTest => write!(f, "capturing_test"),
            RunState::Comparing => write!(f, "comparing"),
            RunState::FeedbackPending => write!(f, "feedback_pending"),
            RunState::Ready => write!(f, "ready"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a completed comparison. Differences are a normal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOutcome {
    NoDifferences,
    DifferencesFound,
}

impl std::fmt::Display for ComparisonOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComparisonOutcome::NoDifferences => write!(f, "no_differences"),
            ComparisonOutcome::DifferencesFound => write!(f, "differences_found"),
        }
    }
}

/// What happened to the optional feedback step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedbackStatus {
    /// Feedback was generated and written next to the report.
    Attached { provider: String },
    /// No provider is configured.
    NotConfigured,
    /// The captured image could not be resolved, so no provider was called.
    ArtifactMissing { detail: String },
    /// The provider was called and failed.
    ProviderFailed { provider: String, detail: String },
}

impl FeedbackStatus {
    pub fn is_attached(&self) -> bool {
        matches!(self, FeedbackStatus::Attached { .. })
    }
}

/// Input to one comparison, as received from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRequest {
    #[serde(default)]
    pub reference_url: Option<String>,
    #[serde(default)]
    pub test_url: Option<String>,
    #[serde(default, alias = "viewport")]
    pub viewport_type: Option<String>,
}

impl ComparisonRequest {
    pub fn new(reference_url: &str, test_url: &str, viewport: Option<&str>) -> Self {
        Self {
            reference_url: Some(reference_url.to_string()),
            test_url: Some(test_url.to_string()),
            viewport_type: viewport.map(str::to_string),
        }
    }
}

/// Caller-visible result of a run that reached `Ready`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub state: RunState,
    pub viewport: Viewport,
    pub outcome: ComparisonOutcome,
    pub feedback: FeedbackStatus,
    pub report_augmented: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Artifacts>,
}

impl RunSummary {
    pub fn feedback_attached(&self) -> bool {
        self.feedback.is_attached()
    }
}

/// One comparison run, alive for the duration of the request that created it.
#[derive(Debug)]
pub struct Run {
    pub id: RunId,
    pub reference_url: String,
    pub test_url: String,
    pub viewport: Viewport,
    pub workspace: Workspace,
    pub started: DateTime<Utc>,
    state: RunState,
    artifacts: Option<Artifacts>,
    feedback: Option<String>,
}

impl Run {
    pub fn new(
        id: RunId,
        reference_url: String,
        test_url: String,
        viewport: Viewport,
        workspace: Workspace,
    ) -> Self {
        Self {
            id,
            reference_url,
            test_url,
            viewport,
            workspace,
            started: Utc::now(),
            state: RunState::Created,
            artifacts: None,
            feedback: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn artifacts(&self) -> Option<&Artifacts> {
        self.artifacts.as_ref()
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn advance(&mut self, next: RunState) -> Result<(), TransitionError> {
        if !self.state.can_advance_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Record the resolved images. Only allowed once, after both captures.
    pub fn set_artifacts(&mut self, artifacts: Artifacts) -> Result<(), TransitionError> {
        if self.artifacts.is_some()
            || !matches!(self.state, RunState::Comparing | RunState::FeedbackPending)
        {
            return Err(TransitionError {
                from: self.state,
                to: self.state,
            });
        }
        self.artifacts = Some(artifacts);
        Ok(())
    }

    pub fn set_feedback(&mut self, text: String) {
        self.feedback = Some(text);
    }
}
