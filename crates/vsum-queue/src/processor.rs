//! Processor contract and the stage-reporting side channel.
//!
//! The processor is supplied by the caller (the code that wires metadata
//! fetch → transcript fetch → summary generation → save) and is swappable
//! without touching the queue.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use vsum_models::{ImportJob, JobStage};

use crate::error::ProcessorError;
use crate::queue::QueueInner;

/// Successful processor completion, optionally carrying a terminal stage.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// Stage to record on the succeeded job; defaults to `Completed`
    pub stage: Option<JobStage>,
}

impl Completion {
    pub fn at_stage(stage: JobStage) -> Self {
        Self { stage: Some(stage) }
    }
}

/// What a processor call resolves to.
pub type ProcessorResult = Result<Completion, ProcessorError>;

/// Externally supplied async worker that performs the actual import.
///
/// A panic inside the processor is treated like an explicit failure, using
/// the panic message.
pub trait ImportProcessor: Send + Sync {
    fn process(&self, job: ImportJob, stages: StageHandle) -> BoxFuture<'static, ProcessorResult>;
}

impl<F, Fut> ImportProcessor for F
where
    F: Fn(ImportJob, StageHandle) -> Fut + Send + Sync,
    Fut: Future<Output = ProcessorResult> + Send + 'static,
{
    fn process(&self, job: ImportJob, stages: StageHandle) -> BoxFuture<'static, ProcessorResult> {
        Box::pin(self(job, stages))
    }
}

/// Narrow callback surface handed to the processor for one job.
///
/// Bound to a single attempt: once the job completes, is removed, or is
/// recovered, every method becomes a no-op.
#[derive(Clone)]
pub struct StageHandle {
    inner: Arc<QueueInner>,
    video_id: String,
    attempt: u32,
}

impl StageHandle {
    pub(crate) fn new(inner: Arc<QueueInner>, video_id: String, attempt: u32) -> Self {
        Self {
            inner,
            video_id,
            attempt,
        }
    }

    /// The job this handle reports for.
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Publish coarse-grained progress.
    ///
    /// Refreshes `updated_at` even when the label is unchanged, so callers
    /// can poll it as a liveness signal during long external calls.
    pub fn update_stage(&self, stage: JobStage) {
        self.inner
            .commit_stage(&self.video_id, self.attempt, Some(stage));
    }

    /// Refresh the liveness timestamps without changing the stage label.
    pub fn heartbeat(&self) {
        self.inner.commit_stage(&self.video_id, self.attempt, None);
    }
}
