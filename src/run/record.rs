use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::types::{ComparisonOutcome, FeedbackStatus, RunId, RunState, Viewport};

/// Persisted summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub reference_url: String,
    pub test_url: String,
    pub viewport: Viewport,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ComparisonOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackStatus>,
    #[serde(default)]
    pub report_augmented: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

/// File-based store of run records, one JSON file per run.
pub struct RunRecordStore {
    base_dir: PathBuf,
}

impl RunRecordStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: data_dir.as_ref().join("runs"),
        }
    }

    fn record_path(&self, id: &RunId) -> PathBuf {
        self.base_dir.join(format!("{}.json", id))
    }

    /// Each run writes only its own file, so no cross-run locking is needed.
    pub async fn save(&self, record: &RunRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.base_dir.display()))?;

        let path = self.record_path(&record.id);
        let tmp_path = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    pub async fn load(&self, id: &RunId) -> Result<RunRecord> {
        let path = self.record_path(id);
        let data = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read run record: {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("Failed to parse run record: {}", id))
    }
}
