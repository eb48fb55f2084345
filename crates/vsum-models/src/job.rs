//! Import job definitions for the batch queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    /// Job is waiting in the queue
    #[default]
    Queued,
    /// Job is being processed
    Processing,
    /// Job completed successfully
    Succeeded,
    /// Job failed and needs an explicit retry
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no further transition without an
    /// explicit retry).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sub-step label describing progress while a job is being processed.
///
/// Retained after completion for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum JobStage {
    #[default]
    Queued,
    FetchingMetadata,
    FetchingTranscript,
    GeneratingSummary,
    Completed,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Queued => "queued",
            JobStage::FetchingMetadata => "fetchingMetadata",
            JobStage::FetchingTranscript => "fetchingTranscript",
            JobStage::GeneratingSummary => "generatingSummary",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One import tracked by the queue.
///
/// The `video_id` is the unique key and never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    /// Video ID, unique key within the queue
    pub video_id: String,

    /// Source URL handed to the processor
    pub url: String,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Current stage label
    #[serde(default)]
    pub stage: JobStage,

    /// Times the scheduler has picked this job up; never reset by retry
    #[serde(default)]
    pub attempts: u32,

    /// Last failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// When the stage label last changed or was heartbeat-refreshed
    pub stage_updated_at: DateTime<Utc>,

    /// When the current attempt started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the scheduler last picked this job up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempted_at: Option<DateTime<Utc>>,

    /// When the job succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// Create a freshly queued job.
    pub fn new(video_id: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            video_id: video_id.into(),
            url: url.into(),
            status: JobStatus::Queued,
            stage: JobStage::Queued,
            attempts: 0,
            error: None,
            created_at: now,
            updated_at: now,
            stage_updated_at: now,
            started_at: None,
            last_attempted_at: None,
            completed_at: None,
        }
    }

    /// Move the job into processing for a new attempt.
    pub fn begin_attempt(&mut self) {
        let now = Utc::now();
        self.status = JobStatus::Processing;
        self.attempts += 1;
        self.error = None;
        self.started_at = Some(now);
        self.last_attempted_at = Some(now);
        self.updated_at = now;
        self.stage_updated_at = now;
    }

    /// Mark the job as succeeded with a terminal stage.
    pub fn complete(&mut self, stage: JobStage) {
        let now = Utc::now();
        self.status = JobStatus::Succeeded;
        self.stage = stage;
        self.error = None;
        self.updated_at = now;
        self.stage_updated_at = now;
        self.completed_at = Some(now);
    }

    /// Mark the job as failed.
    pub fn fail(&mut self, error: impl Into<String>, stage: JobStage) {
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.stage = stage;
        self.error = Some(error.into());
        self.updated_at = now;
        self.stage_updated_at = now;
    }

    /// Return a terminal job to the queue, preserving the attempt count and
    /// its position in the insertion order.
    pub fn reset_for_retry(&mut self) {
        let now = Utc::now();
        self.status = JobStatus::Queued;
        self.stage = JobStage::Queued;
        self.error = None;
        self.started_at = None;
        self.updated_at = now;
        self.stage_updated_at = now;
    }

    /// Refresh the stage label and liveness timestamps.
    ///
    /// Timestamps are refreshed even when the label is unchanged so callers
    /// can poll `updated_at` as a heartbeat during long external calls.
    pub fn touch_stage(&mut self, stage: Option<JobStage>) {
        let now = Utc::now();
        if let Some(stage) = stage {
            self.stage = stage;
        }
        self.updated_at = now;
        self.stage_updated_at = now;
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
