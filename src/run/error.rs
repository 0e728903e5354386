use thiserror::Error;

use crate::capture::engine::EngineError;
use crate::run::types::{RunId, RunState};

/// Bad input, rejected before any workspace exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Both referenceUrl and testUrl are required (missing: {0})")]
    MissingUrl(&'static str),

    #[error("Invalid run id '{0}'")]
    InvalidRunId(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid run state transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: RunState,
    pub to: RunState,
}

/// Errors fatal to a comparison run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Run {run_id} failed: {source}")]
    Engine {
        run_id: RunId,
        #[source]
        source: EngineError,
    },

    #[error("Run {run_id}: {source}")]
    Transition {
        run_id: RunId,
        #[source]
        source: TransitionError,
    },
}

impl RunError {
    /// Id of the run, if one was created before the failure.
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            RunError::Validation(_) => None,
            RunError::Engine { run_id, .. } | RunError::Transition { run_id, .. } => Some(*run_id),
        }
    }
}
