//! Authoritative in-memory queue state.
//!
//! Holds the key→job mapping, the insertion-order list, and the active
//! pointer. All access goes through the queue's single mutex, so readers
//! never observe a job mid-update.

use std::collections::HashMap;

use serde::Serialize;

use vsum_models::{ImportJob, JobStatus};

/// The job currently owned by the scheduler, tagged with its attempt number
/// so a late completion from a removed or recovered job can be recognized
/// and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAttempt {
    pub video_id: String,
    pub attempt: u32,
}

/// Counts per status for display purposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Key→job mapping plus insertion order and the active pointer.
///
/// Insertion order is preserved across retries: a retried job keeps its
/// original position, it is not moved to the back.
#[derive(Debug, Default)]
pub struct QueueState {
    jobs: HashMap<String, ImportJob>,
    order: Vec<String>,
    active: Option<ActiveAttempt>,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.jobs.contains_key(video_id)
    }

    pub fn get(&self, video_id: &str) -> Option<&ImportJob> {
        self.jobs.get(video_id)
    }

    pub fn get_mut(&mut self, video_id: &str) -> Option<&mut ImportJob> {
        self.jobs.get_mut(video_id)
    }

    /// Insert a new job at the back of the insertion order.
    ///
    /// Callers must have checked uniqueness first; a duplicate key would
    /// orphan an order entry.
    pub fn insert(&mut self, job: ImportJob) {
        debug_assert!(!self.contains(&job.video_id));
        self.order.push(job.video_id.clone());
        self.jobs.insert(job.video_id.clone(), job);
    }

    /// Earliest queued job in insertion order, if any.
    pub fn next_queued(&self) -> Option<&ImportJob> {
        self.order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .find(|job| job.status == JobStatus::Queued)
    }

    pub fn has_queued(&self) -> bool {
        self.next_queued().is_some()
    }

    /// Transition a queued job to processing and take ownership of it.
    ///
    /// Returns a snapshot of the dispatched job and its attempt number.
    pub fn begin_attempt(&mut self, video_id: &str) -> Option<(ImportJob, u32)> {
        let job = self.jobs.get_mut(video_id)?;
        if job.status != JobStatus::Queued {
            return None;
        }

        job.begin_attempt();
        let attempt = job.attempts;
        self.active = Some(ActiveAttempt {
            video_id: video_id.to_string(),
            attempt,
        });
        Some((job.clone(), attempt))
    }

    pub fn active(&self) -> Option<&ActiveAttempt> {
        self.active.as_ref()
    }

    /// Clear the active pointer if it refers to the given key.
    pub fn clear_active_for(&mut self, video_id: &str) {
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.video_id == video_id)
        {
            self.active = None;
        }
    }

    /// Delete a job unconditionally. Returns whether it existed.
    pub fn remove(&mut self, video_id: &str) -> bool {
        if self.jobs.remove(video_id).is_none() {
            return false;
        }
        self.order.retain(|id| id != video_id);
        self.clear_active_for(video_id);
        true
    }

    /// Delete every succeeded job. Returns the number removed.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| job.status != JobStatus::Succeeded);
        let jobs = &self.jobs;
        self.order.retain(|id| jobs.contains_key(id));
        before - self.jobs.len()
    }

    /// IDs of all queued jobs in insertion order.
    pub fn queued_ids(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| {
                self.jobs
                    .get(*id)
                    .is_some_and(|job| job.status == JobStatus::Queued)
            })
            .cloned()
            .collect()
    }

    /// Snapshots of all jobs in insertion order.
    pub fn jobs_in_order(&self) -> Vec<ImportJob> {
        self.order
            .iter()
            .filter_map(|id| self.jobs.get(id).cloned())
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.jobs.len(),
            ..QueueStats::default()
        };
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Succeeded => stats.succeeded += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsum_models::JobStage;

    fn job(video_id: &str) -> ImportJob {
        ImportJob::new(video_id, format!("https://youtube.com/watch?v={video_id}"))
    }

    #[test]
    fn test_fifo_pick_skips_non_queued() {
        let mut state = QueueState::new();
        state.insert(job("v1"));
        state.insert(job("v2"));

        assert_eq!(state.next_queued().unwrap().video_id, "v1");

        let (_, attempt) = state.begin_attempt("v1").unwrap();
        assert_eq!(attempt, 1);
        state.get_mut("v1").unwrap().fail("boom", JobStage::Failed);
        state.clear_active_for("v1");

        assert_eq!(state.next_queued().unwrap().video_id, "v2");
    }

    #[test]
    fn test_retried_job_keeps_original_slot() {
        let mut state = QueueState::new();
        state.insert(job("v1"));
        state.insert(job("v2"));

        state.begin_attempt("v1").unwrap();
        state.get_mut("v1").unwrap().fail("boom", JobStage::Failed);
        state.clear_active_for("v1");

        state.get_mut("v1").unwrap().reset_for_retry();
        assert_eq!(state.next_queued().unwrap().video_id, "v1");
    }

    #[test]
    fn test_begin_attempt_requires_queued() {
        let mut state = QueueState::new();
        state.insert(job("v1"));

        state.begin_attempt("v1").unwrap();
        assert!(state.begin_attempt("v1").is_none());
        assert!(state.begin_attempt("missing").is_none());
    }

    #[test]
    fn test_remove_clears_active_pointer() {
        let mut state = QueueState::new();
        state.insert(job("v1"));
        state.begin_attempt("v1").unwrap();
        assert!(state.active().is_some());

        assert!(state.remove("v1"));
        assert!(state.active().is_none());
        assert!(state.is_empty());
        assert!(!state.remove("v1"));
    }

    #[test]
    fn test_clear_completed_only_prunes_succeeded() {
        let mut state = QueueState::new();
        state.insert(job("v1"));
        state.insert(job("v2"));
        state.insert(job("v3"));

        state.begin_attempt("v1").unwrap();
        state.get_mut("v1").unwrap().complete(JobStage::Completed);
        state.clear_active_for("v1");
        state.begin_attempt("v2").unwrap();
        state.get_mut("v2").unwrap().fail("boom", JobStage::Failed);
        state.clear_active_for("v2");

        assert_eq!(state.clear_completed(), 1);
        let remaining: Vec<String> = state
            .jobs_in_order()
            .into_iter()
            .map(|job| job.video_id)
            .collect();
        assert_eq!(remaining, vec!["v2".to_string(), "v3".to_string()]);
    }

    #[test]
    fn test_stats_counts_by_status() {
        let mut state = QueueState::new();
        state.insert(job("v1"));
        state.insert(job("v2"));
        state.begin_attempt("v1").unwrap();

        let stats = state.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.succeeded, 0);
    }
}
