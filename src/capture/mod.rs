pub mod config;
pub mod engine;
pub mod gateway;
pub mod locator;

pub use config::CaptureConfig;
pub use engine::{BackstopEngine, CaptureEngine, CaptureMode, EngineError};
pub use gateway::{CaptureGateway, CaptureOutcome, CaptureSession};
