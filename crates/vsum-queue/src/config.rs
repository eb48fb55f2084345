//! Queue configuration.

use std::time::Duration;

use vsum_models::JobStage;

/// Configuration for the batch-import queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Interval between watchdog checks
    pub watchdog_interval: Duration,
    /// Fallback timeout for stages without a dedicated entry
    pub default_stage_timeout: Duration,
    /// Timeout while fetching video metadata
    pub metadata_timeout: Duration,
    /// Timeout while fetching the transcript
    pub transcript_timeout: Duration,
    /// Timeout while generating the summary
    pub summary_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            watchdog_interval: Duration::from_secs(5),
            default_stage_timeout: Duration::from_secs(90),
            metadata_timeout: Duration::from_secs(60),
            transcript_timeout: Duration::from_secs(240),
            summary_timeout: Duration::from_secs(300),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            watchdog_interval: env_secs("VSUM_WATCHDOG_INTERVAL_SECS", defaults.watchdog_interval),
            default_stage_timeout: env_secs(
                "VSUM_STAGE_TIMEOUT_SECS",
                defaults.default_stage_timeout,
            ),
            metadata_timeout: env_secs("VSUM_METADATA_TIMEOUT_SECS", defaults.metadata_timeout),
            transcript_timeout: env_secs(
                "VSUM_TRANSCRIPT_TIMEOUT_SECS",
                defaults.transcript_timeout,
            ),
            summary_timeout: env_secs("VSUM_SUMMARY_TIMEOUT_SECS", defaults.summary_timeout),
        }
    }

    /// Watchdog timeout for a given stage.
    pub fn stage_timeout(&self, stage: JobStage) -> Duration {
        match stage {
            JobStage::FetchingMetadata => self.metadata_timeout,
            JobStage::FetchingTranscript => self.transcript_timeout,
            JobStage::GeneratingSummary => self.summary_timeout,
            _ => self.default_stage_timeout,
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = QueueConfig::default();
        assert_eq!(config.watchdog_interval, Duration::from_secs(5));
        assert_eq!(config.transcript_timeout, Duration::from_secs(240));
    }

    #[test]
    fn test_stage_timeout_mapping() {
        let config = QueueConfig::default();
        assert_eq!(
            config.stage_timeout(JobStage::FetchingMetadata),
            config.metadata_timeout
        );
        assert_eq!(
            config.stage_timeout(JobStage::GeneratingSummary),
            config.summary_timeout
        );
        assert_eq!(
            config.stage_timeout(JobStage::Queued),
            config.default_stage_timeout
        );
    }
}
