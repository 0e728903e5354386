pub mod error;
pub mod orchestrator;
pub mod record;
pub mod types;
pub mod workspace;

pub use orchestrator::RunOrchestrator;
