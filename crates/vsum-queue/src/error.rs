//! Processor error types.

use thiserror::Error;

use vsum_models::JobStage;

/// Failure reported by an import processor.
///
/// Captured into the failing job's `error` field; never propagated past the
/// scheduler loop.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProcessorError {
    /// Stage to record on the failed job, if the processor knows where it died
    pub stage: Option<JobStage>,
    /// Human-readable failure message
    pub message: String,
}

impl ProcessorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            stage: None,
            message: message.into(),
        }
    }

    pub fn at_stage(message: impl Into<String>, stage: JobStage) -> Self {
        Self {
            stage: Some(stage),
            message: message.into(),
        }
    }
}

impl From<String> for ProcessorError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProcessorError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
