use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::capture::config::capture_file_name;
use crate::run::types::{RunId, Viewport};
use crate::run::workspace::Workspace;

/// Images produced by a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifacts {
    pub reference: PathBuf,
    pub test: PathBuf,
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Capture root {} does not exist", .0.display())]
    RootMissing(PathBuf),

    #[error("Capture root {} contains no capture directory", .0.display())]
    Empty(PathBuf),

    #[error("Capture root {} contains {} capture directories ({}), expected exactly one", root.display(), entries.len(), entries.join(", "))]
    Ambiguous { root: PathBuf, entries: Vec<String> },

    #[error("Capture image not found: {}", .0.display())]
    ImageMissing(PathBuf),

    #[error("Failed to read capture root {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// List the capture directories directly under `root`.
///
/// Plain files and hidden entries are not captures and are skipped. Names
/// come back sorted so error messages are stable.
async fn capture_dirs(root: &Path) -> Result<Vec<String>, ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: root.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArtifactError::RootMissing(root.to_path_buf()));
        }
        Err(e) => return Err(io_err(e)),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type().await.map_err(io_err)?.is_dir() {
            dirs.push(name);
        }
    }
    dirs.sort();
    Ok(dirs)
}

async fn existing(path: PathBuf) -> Result<PathBuf, ArtifactError> {
    match tokio::fs::try_exists(&path).await {
        Ok(true) => Ok(path),
        _ => Err(ArtifactError::ImageMissing(path)),
    }
}

/// Resolve the test capture of a run.
///
/// The engine names the directory under the test root with its own capture
/// timestamp. Exactly one such directory must exist; more than one means the
/// run's root was reused and the right capture cannot be told apart.
pub async fn locate_test(
    run_id: &RunId,
    viewport: Viewport,
    workspace: &Workspace,
) -> Result<PathBuf, ArtifactError> {
    let root = &workspace.test_root;
    let mut dirs = capture_dirs(root).await?;

    let dir = match dirs.len() {
        0 => return Err(ArtifactError::Empty(root.clone())),
        1 => dirs.remove(0),
        _ => {
            warn!(run_id = %run_id, entries = ?dirs, "Ambiguous test capture root");
            return Err(ArtifactError::Ambiguous {
                root: root.clone(),
                entries: dirs,
            });
        }
    };

    info!(run_id = %run_id, capture_dir = %dir, "Found test capture");
    existing(root.join(dir).join(capture_file_name(viewport))).await
}

/// Resolve the reference capture of a run. Its directory is fixed by the
/// workspace, so no listing is needed.
pub async fn locate_reference(
    viewport: Viewport,
    workspace: &Workspace,
) -> Result<PathBuf, ArtifactError> {
    existing(workspace.reference_root.join(capture_file_name(viewport))).await
}

pub async fn locate(
    run_id: &RunId,
    viewport: Viewport,
    workspace: &Workspace,
) -> Result<Artifacts, ArtifactError> {
    let test = locate_test(run_id, viewport, workspace).await?;
    let reference = locate_reference(viewport, workspace).await?;
    Ok(Artifacts { reference, test })
}
