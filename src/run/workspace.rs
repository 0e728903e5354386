use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::run::types::RunId;

pub const CONFIGS_DIR: &str = "configs";
pub const REFERENCE_DIR: &str = "bitmaps_reference";
pub const TEST_DIR: &str = "bitmaps_test";
pub const HTML_REPORT_DIR: &str = "html_report";
pub const CI_REPORT_DIR: &str = "ci_report";

/// Run-exclusive filesystem roots.
///
/// Every root contains the run id as a path segment, so two distinct runs
/// never share an output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    /// Copy of the engine configuration written for this run.
    pub config_file: PathBuf,
    /// Where the engine writes reference captures.
    pub reference_root: PathBuf,
    /// Parent of the engine's timestamped test capture directory.
    pub test_root: PathBuf,
    /// Static HTML report for this run.
    pub report_root: PathBuf,
    pub ci_report_root: PathBuf,
}

impl Workspace {
    /// Derive the workspace of `id` under `data_dir`. Does not touch the
    /// filesystem.
    pub fn derive(data_dir: &Path, id: &RunId) -> Self {
        let id_segment = id.to_string();
        Self {
            config_file: data_dir.join(CONFIGS_DIR).join(format!("{}.json", id_segment)),
            reference_root: data_dir
                .join(REFERENCE_DIR)
                .join(&id_segment)
                .join(id.capture_stamp()),
            test_root: data_dir.join(TEST_DIR).join(&id_segment),
            report_root: report_root(data_dir, id),
            ci_report_root: data_dir.join(CI_REPORT_DIR).join(&id_segment),
        }
    }

    pub fn roots(&self) -> [&Path; 5] {
        [
            &self.config_file,
            &self.reference_root,
            &self.test_root,
            &self.report_root,
            &self.ci_report_root,
        ]
    }
}

/// Report directory of `id`, usable without deriving a full workspace.
pub fn report_root(data_dir: &Path, id: &RunId) -> PathBuf {
    data_dir.join(HTML_REPORT_DIR).join(id.to_string())
}
