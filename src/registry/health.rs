//! Collector health records
//!
//! Each registered collector owns one record. The registry updates it after
//! every run; consecutive failures walk the status from healthy to degraded to
//! failed, and any success snaps it straight back to healthy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consecutive failures at which a collector is degraded
pub const DEGRADED_AFTER: u32 = 2;

/// Consecutive failures at which a collector is failed and leaves the rotation
pub const FAILED_AFTER: u32 = 5;

/// Reliability status of a collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failed,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Failed => "failed",
        }
    }

    /// Status implied by a run of consecutive failures
    pub fn for_consecutive_failures(failures: u32) -> Self {
        if failures >= FAILED_AFTER {
            HealthStatus::Failed
        } else if failures >= DEGRADED_AFTER {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Whether the collector is dispatched on ordinary runs
    pub fn is_eligible(&self) -> bool {
        !matches!(self, HealthStatus::Failed)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolling reliability state of one collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub status: HealthStatus,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRecord {
    /// Fresh record for a newly registered collector
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            total_successes: 0,
            total_failures: 0,
            updated_at: Utc::now(),
        }
    }

    /// Record a successful run
    pub fn record_success(&mut self) {
        let now = Utc::now();
        self.status = HealthStatus::Healthy;
        self.consecutive_failures = 0;
        self.total_successes += 1;
        self.last_success = Some(now);
        self.last_error = None;
        self.updated_at = now;
    }

    /// Record a failed run
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures += 1;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
        self.status = HealthStatus::for_consecutive_failures(self.consecutive_failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_record_is_healthy() {
        let record = HealthRecord::new();
        assert_eq!(record.status, HealthStatus::Healthy);
        assert_eq!(record.consecutive_failures, 0);
        assert!(record.last_success.is_none());
        assert!(record.last_error.is_none());
    }

    #[test]
    fn test_failure_progression() {
        let mut record = HealthRecord::new();

        record.record_failure("timeout");
        assert_eq!(record.status, HealthStatus::Healthy);

        record.record_failure("timeout");
        assert_eq!(record.status, HealthStatus::Degraded);

        for _ in 0..2 {
            record.record_failure("timeout");
        }
        assert_eq!(record.consecutive_failures, 4);
        assert_eq!(record.status, HealthStatus::Degraded);

        record.record_failure("connection refused");
        assert_eq!(record.status, HealthStatus::Failed);
        assert_eq!(record.last_error.as_deref(), Some("connection refused"));
        assert_eq!(record.total_failures, 5);
    }

    #[test]
    fn test_success_recovers_failed() {
        let mut record = HealthRecord::new();
        for _ in 0..7 {
            record.record_failure("boom");
        }
        assert_eq!(record.status, HealthStatus::Failed);

        record.record_success();
        assert_eq!(record.status, HealthStatus::Healthy);
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(record.total_failures, 7);
        assert_eq!(record.total_successes, 1);
        assert!(record.last_success.is_some());
    }

    #[test]
    fn test_status_eligibility() {
        assert!(HealthStatus::Healthy.is_eligible());
        assert!(HealthStatus::Degraded.is_eligible());
        assert!(!HealthStatus::Failed.is_eligible());
    }

    proptest! {
        #[test]
        fn prop_status_tracks_consecutive_failures(outcomes in prop::collection::vec(any::<bool>(), 0..40)) {
            let mut record = HealthRecord::new();
            let mut streak = 0u32;

            for succeeded in outcomes {
                if succeeded {
                    record.record_success();
                    streak = 0;
                    prop_assert_eq!(record.status, HealthStatus::Healthy);
                    prop_assert_eq!(record.consecutive_failures, 0);
                } else {
                    record.record_failure("error");
                    streak += 1;
                }

                prop_assert_eq!(record.consecutive_failures, streak);
                let expected = if streak >= 5 {
                    HealthStatus::Failed
                } else if streak >= 2 {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                prop_assert_eq!(record.status, expected);
            }
        }
    }
}
