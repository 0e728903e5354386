use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::capture::config::CaptureConfig;
use crate::capture::engine::{CaptureEngine, CaptureMode, EngineError, is_mismatch};

/// Result of a test capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    NoDifferences,
    DifferencesFound,
    /// The engine ran and reported a failure that is not a mismatch.
    EngineFailure(String),
}

struct EngineSlot {
    engine: Box<dyn CaptureEngine>,
    config_file: PathBuf,
}

/// Sole access path to the capture engine.
///
/// The engine reads one shared configuration file, so at most one capture may
/// be in flight per process. Callers queue on a FIFO mutex; a
/// [`CaptureSession`] holds the engine until dropped.
#[derive(Clone)]
pub struct CaptureGateway {
    slot: Arc<Mutex<EngineSlot>>,
    pending: Arc<AtomicUsize>,
}

impl CaptureGateway {
    pub fn new(engine: Box<dyn CaptureEngine>, config_file: impl AsRef<Path>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(EngineSlot {
                engine,
                config_file: config_file.as_ref().to_path_buf(),
            })),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sessions currently held or waiting.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait for exclusive use of the engine. Sessions are granted in
    /// arrival order.
    pub async fn session(&self) -> CaptureSession {
        let ahead = self.pending.fetch_add(1, Ordering::SeqCst);
        // Counted from here so a caller dropped while queued is uncounted too.
        let ticket = PendingTicket(self.pending.clone());
        if ahead > 0 {
            info!(ahead = ahead, "Waiting for capture engine");
        }
        let slot = self.slot.clone().lock_owned().await;
        CaptureSession {
            slot,
            _ticket: ticket,
        }
    }

    /// Single reference capture in its own session.
    pub async fn capture_reference(&self, config: &CaptureConfig) -> Result<(), EngineError> {
        self.session().await.capture_reference(config).await
    }

    /// Single test capture in its own session.
    pub async fn capture_test(&self, config: &CaptureConfig) -> Result<CaptureOutcome, EngineError> {
        self.session().await.capture_test(config).await
    }
}

/// Exclusive hold on the capture engine.
pub struct CaptureSession {
    slot: OwnedMutexGuard<EngineSlot>,
    _ticket: PendingTicket,
}

struct PendingTicket(Arc<AtomicUsize>);

impl Drop for PendingTicket {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CaptureSession {
    /// Write `config` to the shared path, replacing whatever the previous
    /// session left there.
    async fn write_config(&self, config: &CaptureConfig) -> Result<(), EngineError> {
        let path = &self.slot.config_file;
        let data = config.to_json()?;
        let io_err = |source| EngineError::ConfigWrite {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &data).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
        Ok(())
    }

    pub async fn capture_reference(&mut self, config: &CaptureConfig) -> Result<(), EngineError> {
        self.write_config(config).await?;
        info!(engine = %self.slot.engine.name(), "Capturing reference");

        match self
            .slot
            .engine
            .invoke(CaptureMode::Reference, &self.slot.config_file)
            .await
        {
            Ok(()) => Ok(()),
            Err(EngineError::Failed { message, .. }) if is_mismatch(&message) => {
                warn!(message = %message, "Reference capture reported a mismatch; ignoring");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn capture_test(&mut self, config: &CaptureConfig) -> Result<CaptureOutcome, EngineError> {
        self.write_config(config).await?;
        info!(engine = %self.slot.engine.name(), "Capturing test and comparing");

        match self
            .slot
            .engine
            .invoke(CaptureMode::Test, &self.slot.config_file)
            .await
        {
            Ok(()) => Ok(CaptureOutcome::NoDifferences),
            Err(EngineError::Failed { message, .. }) => {
                if is_mismatch(&message) {
                    info!("Comparison found differences");
                    Ok(CaptureOutcome::DifferencesFound)
                } else {
                    Ok(CaptureOutcome::EngineFailure(message))
                }
            }
            Err(e) => Err(e),
        }
    }
}
