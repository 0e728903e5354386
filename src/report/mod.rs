use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info};

use crate::run::error::ValidationError;
use crate::run::types::RunId;
use crate::run::workspace;

/// Entry file of the engine's HTML report.
pub const ENTRY_FILE: &str = "index.html";
/// Feedback payload read by the viewer.
pub const FEEDBACK_DATA_FILE: &str = "llm_feedback.json";
pub const VIEWER_SCRIPT_FILE: &str = "llm_feedback.js";

const MARKDOWN_MARKER: &str = r#"id="uicompare-markdown-it""#;
const MARKDOWN_TAG: &str = r#"<script id="uicompare-markdown-it" src="https://cdn.jsdelivr.net/npm/markdown-it@12.0.6/dist/markdown-it.min.js"></script>"#;
const VIEWER_MARKER: &str = r#"id="uicompare-feedback-viewer""#;
const VIEWER_TAG: &str = r#"<script id="uicompare-feedback-viewer" src="llm_feedback.js"></script>"#;
const VIEWER_JS: &str = include_str!("feedback_viewer.js");

#[derive(Error, Debug)]
pub enum AugmentError {
    #[error("Report entry file not found: {}", .0.display())]
    EntryMissing(PathBuf),

    #[error("Failed to update {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode feedback: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    InvalidId(#[from] ValidationError),

    #[error("Report for run {0} not found")]
    NotFound(RunId),
}

/// Insert `tag` before the first `anchor` (case-insensitive), or append it
/// when the anchor is absent. Does nothing if `marker` is already present.
fn inject(html: &str, marker: &str, anchor: &str, tag: &str) -> String {
    if html.contains(marker) {
        return html.to_string();
    }
    match html.to_ascii_lowercase().find(anchor) {
        Some(pos) => format!("{}{}{}", &html[..pos], tag, &html[pos..]),
        None => format!("{}{}", html, tag),
    }
}

/// Add the markdown renderer and the viewer script to a report page.
/// Applying it to its own output returns the same page.
pub fn inject_markup(html: &str) -> String {
    let html = inject(html, MARKDOWN_MARKER, "</head>", MARKDOWN_TAG);
    inject(&html, VIEWER_MARKER, "</body>", VIEWER_TAG)
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), AugmentError> {
    let io_err = |source| AugmentError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, data).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}

/// Write the feedback files next to the report and inject the viewer.
pub async fn try_augment(report_root: &Path, feedback: &str) -> Result<(), AugmentError> {
    let entry = report_root.join(ENTRY_FILE);
    if !tokio::fs::try_exists(&entry).await.unwrap_or(false) {
        return Err(AugmentError::EntryMissing(entry));
    }

    let payload = serde_json::to_vec(&serde_json::json!({ "feedback": feedback }))?;
    write_atomic(&report_root.join(FEEDBACK_DATA_FILE), &payload).await?;
    write_atomic(&report_root.join(VIEWER_SCRIPT_FILE), VIEWER_JS.as_bytes()).await?;

    let html = tokio::fs::read_to_string(&entry)
        .await
        .map_err(|source| AugmentError::Io {
            path: entry.clone(),
            source,
        })?;
    let augmented = inject_markup(&html);
    if augmented != html {
        write_atomic(&entry, augmented.as_bytes()).await?;
    }
    Ok(())
}

/// Best-effort [`try_augment`]: logs failures and reports success as a flag.
/// A report without the viewer is still a valid report.
pub async fn augment(report_root: &Path, feedback: &str) -> bool {
    match try_augment(report_root, feedback).await {
        Ok(()) => {
            info!(report = %report_root.display(), "Injected feedback viewer into report");
            true
        }
        Err(e) => {
            error!(report = %report_root.display(), error = %e, "Report augmentation failed");
            false
        }
    }
}

/// Entry file of a run's report, looked up on disk by id alone.
pub async fn fetch_report(data_dir: &Path, run_id: &str) -> Result<PathBuf, ReportError> {
    let id = RunId::parse(run_id)?;
    let entry = workspace::report_root(data_dir, &id).join(ENTRY_FILE);
    if tokio::fs::try_exists(&entry).await.unwrap_or(false) {
        Ok(entry)
    } else {
        Err(ReportError::NotFound(id))
    }
}
