//! Reconciliation counters and outcome reporting.
//!
//! Pure logic, decoupled from I/O: the reconciler records one
//! [`SyncOutcome`] per record or stale row, and [`SyncReport`] turns the
//! resulting counts into the tri-state status returned to callers.

use serde::Serialize;

/// Outcome of handling a single record or local row during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Remote record was inserted or updated locally.
    Upserted,
    /// Remote record could not be mirrored.
    Failed,
    /// Local row no longer exists remotely and was removed.
    Deleted,
}

/// Statistics for one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub upserted: usize,
    pub failed: usize,
    pub deleted: usize,
}

impl SyncStats {
    /// Creates a new empty stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Upserted => self.upserted += 1,
            SyncOutcome::Failed => self.failed += 1,
            SyncOutcome::Deleted => self.deleted += 1,
        }
    }

    /// Returns the total number of outcomes recorded.
    pub fn total(&self) -> usize {
        self.upserted + self.failed + self.deleted
    }

    /// Returns the number of outcomes that were not failures.
    pub fn successful(&self) -> usize {
        self.upserted + self.deleted
    }
}

/// Aggregate classification of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    PartialFailure,
    CompleteFailure,
}

impl SyncStatus {
    /// Classifies counts.
    ///
    /// No failures is a success, including the empty pass. Failures with
    /// nothing else recorded are a complete failure. Anything in between is
    /// partial.
    pub fn classify(stats: &SyncStats) -> Self {
        if stats.failed == 0 {
            SyncStatus::Success
        } else if stats.total() == stats.failed {
            SyncStatus::CompleteFailure
        } else {
            SyncStatus::PartialFailure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::PartialFailure => "partial_failure",
            SyncStatus::CompleteFailure => "complete_failure",
        }
    }
}

/// Outcome report for one resource, as returned by the sync endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub message: String,
    pub total: usize,
    pub upserted: usize,
    pub failed: usize,
    pub deleted: usize,
}

impl SyncReport {
    /// Builds the report for `resource` (e.g. `"Campaigns"`).
    ///
    /// # Examples
    ///
    /// ```
    /// use adsync_core::sync::{SyncReport, SyncStats, SyncStatus};
    ///
    /// let stats = SyncStats { upserted: 2, failed: 1, deleted: 0 };
    /// let report = SyncReport::new("Campaigns", &stats);
    /// assert_eq!(report.status, SyncStatus::PartialFailure);
    /// assert_eq!(report.total, 3);
    /// ```
    pub fn new(resource: &str, stats: &SyncStats) -> Self {
        let status = SyncStatus::classify(stats);
        let message = match status {
            SyncStatus::Success => format!("{} sync completed successfully", resource),
            SyncStatus::CompleteFailure => format!("{} sync failed completely", resource),
            SyncStatus::PartialFailure => {
                format!("{} sync completed with some failures", resource)
            }
        };
        Self {
            status,
            message,
            total: stats.total(),
            upserted: stats.upserted,
            failed: stats.failed,
            deleted: stats.deleted,
        }
    }
}

/// Reports of a combined run: advertisers first, then campaigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullSyncReport {
    pub advertisers: SyncReport,
    pub campaigns: SyncReport,
}

impl FullSyncReport {
    /// The worse of the two statuses.
    pub fn overall_status(&self) -> SyncStatus {
        use SyncStatus::*;
        match (self.advertisers.status, self.campaigns.status) {
            (Success, Success) => Success,
            (CompleteFailure, CompleteFailure) => CompleteFailure,
            _ => PartialFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(upserted: usize, failed: usize, deleted: usize) -> SyncStats {
        SyncStats {
            upserted,
            failed,
            deleted,
        }
    }

    #[test]
    fn test_sync_stats_record() {
        let mut stats = SyncStats::new();
        stats.record(SyncOutcome::Upserted);
        stats.record(SyncOutcome::Upserted);
        stats.record(SyncOutcome::Failed);
        stats.record(SyncOutcome::Deleted);

        assert_eq!(stats, self::stats(2, 1, 1));
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.successful(), 3);
    }

    #[test]
    fn test_success_with_deletions() {
        let report = SyncReport::new("Campaigns", &stats(5, 0, 2));
        assert_eq!(report.status, SyncStatus::Success);
        assert_eq!(report.total, 7);
        assert_eq!(report.message, "Campaigns sync completed successfully");
    }

    #[test]
    fn test_complete_failure() {
        let report = SyncReport::new("Advertisers", &stats(0, 3, 0));
        assert_eq!(report.status, SyncStatus::CompleteFailure);
        assert_eq!(report.total, 3);
        assert_eq!(report.message, "Advertisers sync failed completely");
    }

    #[test]
    fn test_partial_failure() {
        let report = SyncReport::new("Campaigns", &stats(2, 1, 0));
        assert_eq!(report.status, SyncStatus::PartialFailure);
        assert_eq!(report.total, 3);
        assert_eq!(report.message, "Campaigns sync completed with some failures");
    }

    #[test]
    fn test_failures_with_only_deletions_is_partial() {
        let report = SyncReport::new("Campaigns", &stats(0, 2, 1));
        assert_eq!(report.status, SyncStatus::PartialFailure);
    }

    #[test]
    fn test_empty_pass_is_success() {
        let report = SyncReport::new("Campaigns", &stats(0, 0, 0));
        assert_eq!(report.status, SyncStatus::Success);
        assert_eq!(report.total, 0);
    }

    #[test]
    fn test_report_serialization() {
        let report = SyncReport::new("Campaigns", &stats(0, 3, 0));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "complete_failure");
        assert_eq!(json["failed"], 3);
        assert_eq!(SyncStatus::PartialFailure.as_str(), "partial_failure");
    }

    #[test]
    fn test_overall_status() {
        let ok = SyncReport::new("Advertisers", &stats(1, 0, 0));
        let bad = SyncReport::new("Campaigns", &stats(0, 1, 0));
        let full = FullSyncReport {
            advertisers: ok.clone(),
            campaigns: ok.clone(),
        };
        assert_eq!(full.overall_status(), SyncStatus::Success);

        let mixed = FullSyncReport {
            advertisers: ok,
            campaigns: bad.clone(),
        };
        assert_eq!(mixed.overall_status(), SyncStatus::PartialFailure);

        let all_bad = FullSyncReport {
            advertisers: bad.clone(),
            campaigns: bad,
        };
        assert_eq!(all_bad.overall_status(), SyncStatus::CompleteFailure);
    }
}
