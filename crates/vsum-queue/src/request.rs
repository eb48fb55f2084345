//! Enqueue request and outcome types.

use std::fmt;

use serde::{Deserialize, Serialize};

use vsum_models::ImportJob;

/// One incoming import request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Video ID, the dedup key
    pub video_id: String,
    /// Source URL handed to the processor
    pub url: String,
}

impl ImportRequest {
    pub fn new(video_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            url: url.into(),
        }
    }
}

/// Why an enqueue candidate was not inserted.
///
/// Skips are structured results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// A job with this key is already waiting
    AlreadyQueued,
    /// A job with this key is currently being processed
    AlreadyProcessing,
    /// A job with this key already succeeded
    AlreadyCompleted,
    /// A job with this key failed; the caller must retry it explicitly
    FailedNeedsRetry,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyQueued => "alreadyQueued",
            SkipReason::AlreadyProcessing => "alreadyProcessing",
            SkipReason::AlreadyCompleted => "alreadyCompleted",
            SkipReason::FailedNeedsRetry => "failedNeedsRetry",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request that was not inserted, with its original payload.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedImport {
    pub video_id: String,
    pub url: String,
    pub reason: SkipReason,
}

/// Result of an enqueue call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnqueueOutcome {
    /// Newly created jobs, in insertion order
    pub added: Vec<ImportJob>,
    /// Requests skipped against existing store entries
    pub skipped: Vec<SkippedImport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&SkipReason::FailedNeedsRetry).unwrap(),
            "\"failedNeedsRetry\""
        );
        assert_eq!(SkipReason::AlreadyProcessing.as_str(), "alreadyProcessing");
    }
}
