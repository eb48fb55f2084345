//! The batch-import queue and its single-concurrency scheduler.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use vsum_models::{ImportJob, JobStage, JobStatus};

use crate::config::QueueConfig;
use crate::error::ProcessorError;
use crate::processor::{ImportProcessor, ProcessorResult, StageHandle};
use crate::request::{EnqueueOutcome, ImportRequest, SkipReason, SkippedImport};
use crate::store::{QueueState, QueueStats};

/// Hold token used by the stop operations.
const STOP_HOLD_TOKEN: &str = "batch-stop";

/// In-memory FIFO queue of import jobs with a single-concurrency scheduler.
///
/// Explicitly instantiable: construct one per caller (or per test) and pass
/// it by reference; there are no hidden singletons. Cloning shares the same
/// underlying queue. Must be used within a Tokio runtime: every mutation that
/// can wake the scheduler spawns the drain task on the current runtime.
#[derive(Clone)]
pub struct ImportQueue {
    inner: Arc<QueueInner>,
}

impl Default for ImportQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl ImportQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                config,
                state: Mutex::new(QueueState::new()),
                processor: RwLock::new(None),
                holds: Mutex::new(HashSet::new()),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Register the processor and nudge the scheduler.
    pub fn set_processor<P>(&self, processor: P)
    where
        P: ImportProcessor + 'static,
    {
        {
            let mut slot = self
                .inner
                .processor
                .write()
                .unwrap_or_else(|e| e.into_inner());
            *slot = Some(Arc::new(processor));
        }
        self.inner.poke();
    }

    /// Unregister the processor; queued jobs stay queued until a new one is
    /// registered.
    pub fn clear_processor(&self) {
        let mut slot = self
            .inner
            .processor
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    /// Submit a batch of import requests.
    ///
    /// Duplicate keys within the batch are collapsed to the first occurrence
    /// before any store check; candidates colliding with existing jobs are
    /// reported as skipped with a reason. Accepted jobs are appended in batch
    /// order and the scheduler is nudged if it is idle.
    pub fn enqueue(&self, requests: impl IntoIterator<Item = ImportRequest>) -> EnqueueOutcome {
        let mut outcome = EnqueueOutcome::default();
        let mut seen = HashSet::new();

        {
            let mut state = self.inner.state();
            for request in requests {
                if !seen.insert(request.video_id.clone()) {
                    // Intra-batch duplicate: first occurrence wins, and it is
                    // not reported as a skip.
                    continue;
                }

                match state.get(&request.video_id).map(|job| job.status) {
                    None => {
                        let job = ImportJob::new(request.video_id, request.url);
                        outcome.added.push(job.clone());
                        state.insert(job);
                    }
                    Some(status) => {
                        let reason = match status {
                            JobStatus::Succeeded => SkipReason::AlreadyCompleted,
                            JobStatus::Processing => SkipReason::AlreadyProcessing,
                            JobStatus::Failed => SkipReason::FailedNeedsRetry,
                            JobStatus::Queued => SkipReason::AlreadyQueued,
                        };
                        outcome.skipped.push(SkippedImport {
                            video_id: request.video_id,
                            url: request.url,
                            reason,
                        });
                    }
                }
            }

            if !outcome.added.is_empty() || !outcome.skipped.is_empty() {
                info!(
                    "Enqueued {} job(s), skipped {} (queue length {})",
                    outcome.added.len(),
                    outcome.skipped.len(),
                    state.len()
                );
            }
        }

        if !outcome.added.is_empty() {
            self.inner.poke();
        }
        outcome
    }

    /// Return a terminal job to the queue.
    ///
    /// Keeps the attempt count and the original insertion-order slot.
    /// No-op (returns false) if the job is queued, processing, or missing.
    pub fn retry(&self, video_id: &str) -> bool {
        let applied = {
            let mut state = self.inner.state();
            match state.get_mut(video_id) {
                Some(job) if job.is_terminal() => {
                    job.reset_for_retry();
                    true
                }
                _ => false,
            }
        };

        if applied {
            info!("Job {} queued for retry", video_id);
            self.inner.poke();
        }
        applied
    }

    /// Delete a job unconditionally.
    ///
    /// If the job is mid-processing the active call is allowed to finish;
    /// its eventual result is dropped because the key no longer resolves.
    pub fn remove_job(&self, video_id: &str) -> bool {
        let removed = self.inner.state().remove(video_id);
        if removed {
            info!("Removed job {}", video_id);
        }
        removed
    }

    /// Delete every succeeded job. Returns the number removed.
    pub fn clear_completed(&self) -> usize {
        let removed = self.inner.state().clear_completed();
        if removed > 0 {
            info!("Cleared {} completed job(s)", removed);
        }
        removed
    }

    /// Snapshot of one job.
    pub fn get_job(&self, video_id: &str) -> Option<ImportJob> {
        self.inner.state().get(video_id).cloned()
    }

    /// Snapshots of all jobs in insertion order.
    pub fn jobs(&self) -> Vec<ImportJob> {
        self.inner.state().jobs_in_order()
    }

    /// Snapshot of the job currently being processed.
    pub fn active_job(&self) -> Option<ImportJob> {
        let state = self.inner.state();
        let active = state.active()?;
        state.get(&active.video_id).cloned()
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.state().stats()
    }

    /// Engage or release a named processing hold.
    ///
    /// The scheduler does not dispatch while any hold is engaged; releasing
    /// the last one nudges it.
    pub fn set_processing_hold(&self, token: &str, held: bool) {
        self.inner.set_hold(token, held);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.is_paused()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.holds().contains(STOP_HOLD_TOKEN)
    }

    /// Pause the queue and fail the active job with the given reason.
    ///
    /// The in-flight processor call is not aborted; its late result is
    /// dropped. Returns false when nothing was active; the stop hold stays
    /// engaged either way until `resume_processing` releases it.
    pub fn stop_active(&self, reason: &str) -> bool {
        self.inner.stop_active(reason)
    }

    /// Stop the active job and fail every still-queued job with the reason.
    pub fn stop_all(&self, reason: &str) -> bool {
        self.inner.stop_all(reason)
    }

    /// Release the stop hold and nudge the scheduler.
    pub fn resume_processing(&self) {
        self.inner.set_hold(STOP_HOLD_TOKEN, false);
    }

    /// Return a processing or failed job to the queue (default: the active
    /// one), releasing the stop hold. Returns false if nothing matched.
    pub fn recover_stalled(&self, video_id: Option<&str>) -> bool {
        self.inner.recover_stalled(video_id)
    }

    /// Background stage watchdog.
    ///
    /// Runs indefinitely and should be spawned as a background task. Fails
    /// the active job when its stage has been silent longer than the
    /// configured timeout; the late processor result is then dropped.
    pub async fn run_watchdog(&self) {
        let interval = self.inner.config.watchdog_interval;
        info!("Starting queue watchdog (interval: {:?})", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.inner.check_stage_timeout();
        }
    }
}

pub(crate) struct QueueInner {
    config: QueueConfig,
    state: Mutex<QueueState>,
    processor: RwLock<Option<Arc<dyn ImportProcessor>>>,
    holds: Mutex<HashSet<String>>,
    /// Guards the drain task: a re-entrant nudge while a job is active is a
    /// no-op instead of a recursive dispatch.
    in_flight: AtomicBool,
}

impl QueueInner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn holds(&self) -> MutexGuard<'_, HashSet<String>> {
        self.holds.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn processor(&self) -> Option<Arc<dyn ImportProcessor>> {
        self.processor
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn is_paused(&self) -> bool {
        !self.holds().is_empty()
    }

    /// Try to start the drain task. Safe to call from every mutation site.
    fn poke(self: &Arc<Self>) {
        if self.processor().is_none() || self.is_paused() {
            return;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.drive().await });
    }

    /// Drain queued jobs one at a time until none remain or the queue is
    /// paused.
    async fn drive(self: Arc<Self>) {
        loop {
            if self.is_paused() {
                break;
            }
            let Some(processor) = self.processor() else {
                break;
            };
            let Some((snapshot, attempt)) = self.dispatch_next() else {
                break;
            };

            let video_id = snapshot.video_id.clone();
            info!("Dispatching job {} (attempt {})", video_id, attempt);

            let stages = StageHandle::new(Arc::clone(&self), video_id.clone(), attempt);
            // Spawned so a panicking processor surfaces as a JoinError
            // instead of tearing down the scheduler.
            let task = tokio::spawn(processor.process(snapshot, stages));
            let result = match task.await {
                Ok(result) => result,
                Err(join_error) => Err(ProcessorError::new(panic_message(join_error))),
            };

            self.finish_attempt(&video_id, attempt, result);
        }

        self.in_flight.store(false, Ordering::SeqCst);
        // Catch jobs enqueued between the last empty check and the flag
        // release; their nudge lost the swap above.
        if self.state().has_queued() {
            self.poke();
        }
    }

    fn dispatch_next(&self) -> Option<(ImportJob, u32)> {
        let mut state = self.state();
        let video_id = state.next_queued()?.video_id.clone();
        state.begin_attempt(&video_id)
    }

    fn finish_attempt(&self, video_id: &str, attempt: u32, result: ProcessorResult) {
        let mut state = self.state();
        let Some(job) = state.get_mut(video_id) else {
            debug!("Dropping late result for removed job {}", video_id);
            return;
        };
        if job.status != JobStatus::Processing || job.attempts != attempt {
            debug!(
                "Dropping late result for job {} (attempt {})",
                video_id, attempt
            );
            return;
        }

        match result {
            Ok(completion) => {
                job.complete(completion.stage.unwrap_or(JobStage::Completed));
                info!("Job {} succeeded (attempt {})", video_id, attempt);
            }
            Err(error) => {
                warn!(
                    "Job {} failed (attempt {}): {}",
                    video_id, attempt, error.message
                );
                let stage = error.stage.unwrap_or(JobStage::Failed);
                job.fail(error.message, stage);
            }
        }
        state.clear_active_for(video_id);
    }

    /// Stage update / heartbeat from a processor, bound to one attempt.
    pub(crate) fn commit_stage(&self, video_id: &str, attempt: u32, stage: Option<JobStage>) {
        let mut state = self.state();
        let Some(job) = state.get_mut(video_id) else {
            return;
        };
        if job.status != JobStatus::Processing || job.attempts != attempt {
            return;
        }

        let changed = stage.is_some_and(|stage| stage != job.stage);
        job.touch_stage(stage);

        if changed {
            info!("Job {} entered stage {}", video_id, job.stage);
        } else {
            debug!("Heartbeat for job {} in stage {}", video_id, job.stage);
        }
    }

    fn set_hold(self: &Arc<Self>, token: &str, held: bool) {
        let (was_paused, now_paused) = {
            let mut holds = self.holds();
            let was_paused = !holds.is_empty();
            if held {
                holds.insert(token.to_string());
            } else {
                holds.remove(token);
            }
            (was_paused, !holds.is_empty())
        };

        if was_paused != now_paused {
            if now_paused {
                info!("Queue paused");
            } else {
                info!("Queue resumed");
                self.poke();
            }
        }
    }

    fn stop_active(self: &Arc<Self>, reason: &str) -> bool {
        // Hold first: once the in-flight call resolves, the drain loop must
        // see the pause before it can dispatch the next queued job.
        self.set_hold(STOP_HOLD_TOKEN, true);

        let stopped = {
            let mut state = self.state();
            let Some(active) = state.active().cloned() else {
                return false;
            };
            if let Some(job) = state.get_mut(&active.video_id) {
                if job.status == JobStatus::Processing {
                    job.fail(reason, JobStage::Failed);
                }
            }
            state.clear_active_for(&active.video_id);
            active.video_id
        };

        warn!("Stopped active job {}: {}", stopped, reason);
        true
    }

    fn stop_all(self: &Arc<Self>, reason: &str) -> bool {
        let stopped_active = self.stop_active(reason);

        let affected = {
            let mut state = self.state();
            let ids = state.queued_ids();
            for id in &ids {
                if let Some(job) = state.get_mut(id) {
                    job.fail(reason, JobStage::Failed);
                }
            }
            ids
        };

        if !affected.is_empty() {
            warn!("Stopped {} queued job(s): {}", affected.len(), reason);
        }
        stopped_active || !affected.is_empty()
    }

    fn recover_stalled(self: &Arc<Self>, video_id: Option<&str>) -> bool {
        let recovered = {
            let mut state = self.state();
            let target = video_id
                .map(str::to_string)
                .or_else(|| state.active().map(|active| active.video_id.clone()));
            let Some(target) = target else {
                return false;
            };

            let applied = match state.get_mut(&target) {
                Some(job)
                    if matches!(job.status, JobStatus::Processing | JobStatus::Failed) =>
                {
                    job.reset_for_retry();
                    true
                }
                _ => false,
            };

            if applied {
                state.clear_active_for(&target);
                Some(target)
            } else {
                None
            }
        };

        match recovered {
            Some(target) => {
                info!("Recovered stalled job {}", target);
                self.set_hold(STOP_HOLD_TOKEN, false);
                self.poke();
                true
            }
            None => false,
        }
    }

    fn check_stage_timeout(&self) {
        let mut state = self.state();
        let Some(active) = state.active().cloned() else {
            return;
        };
        let Some(job) = state.get_mut(&active.video_id) else {
            return;
        };
        if job.status != JobStatus::Processing || job.attempts != active.attempt {
            return;
        }

        let timeout = self.config.stage_timeout(job.stage);
        let elapsed = (Utc::now() - job.stage_updated_at)
            .to_std()
            .unwrap_or_default();
        if elapsed < timeout {
            return;
        }

        warn!(
            "Watchdog timeout for job {}: stage {} silent for {:?}",
            active.video_id, job.stage, elapsed
        );
        let reason = format!(
            "Processing timed out in stage \"{}\" after {}s",
            job.stage,
            timeout.as_secs()
        );
        job.fail(reason, JobStage::Failed);
        state.clear_active_for(&active.video_id);
    }
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if error.is_panic() {
        let payload = error.into_panic();
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "processor panicked".to_string()
        }
    } else {
        "processor task cancelled".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without a registered processor nothing is dispatched, so the enqueue
    // bookkeeping can be exercised synchronously.

    fn requests(pairs: &[(&str, &str)]) -> Vec<ImportRequest> {
        pairs
            .iter()
            .map(|(id, url)| ImportRequest::new(*id, *url))
            .collect()
    }

    #[test]
    fn test_enqueue_collapses_intra_batch_duplicates() {
        let queue = ImportQueue::default();

        let outcome = queue.enqueue(requests(&[
            ("v1", "urlA"),
            ("v2", "urlB"),
            ("v1", "urlC"),
        ]));

        let added: Vec<&str> = outcome.added.iter().map(|j| j.video_id.as_str()).collect();
        assert_eq!(added, vec!["v1", "v2"]);
        assert!(outcome.skipped.is_empty());
        assert_eq!(queue.get_job("v1").unwrap().url, "urlA");
        assert_eq!(queue.stats().total, 2);
    }

    #[test]
    fn test_enqueue_skips_already_queued() {
        let queue = ImportQueue::default();
        queue.enqueue(requests(&[("v1", "urlA")]));

        let outcome = queue.enqueue(requests(&[("v1", "urlB")]));
        assert!(outcome.added.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason, SkipReason::AlreadyQueued);
        assert_eq!(outcome.skipped[0].url, "urlB");
        assert_eq!(queue.get_job("v1").unwrap().url, "urlA");
    }

    #[test]
    fn test_mutations_on_unknown_keys_are_noops() {
        let queue = ImportQueue::default();
        assert!(!queue.retry("missing"));
        assert!(!queue.remove_job("missing"));
        assert_eq!(queue.clear_completed(), 0);
        assert!(queue.get_job("missing").is_none());
    }

    #[test]
    fn test_retry_is_noop_for_queued_job() {
        let queue = ImportQueue::default();
        queue.enqueue(requests(&[("v1", "urlA")]));
        assert!(!queue.retry("v1"));
        assert_eq!(queue.get_job("v1").unwrap().attempts, 0);
    }
}
