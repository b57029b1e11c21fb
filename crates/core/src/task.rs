//! Task record snapshots and derived timing figures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::status::TaskStatus;
use crate::types::{OwnerId, TaskId, Timestamp};

/// Progress reported when a worker picks a task up.
pub const STARTED_PROGRESS: u8 = 10;

/// Progress of a completed task.
pub const COMPLETE_PROGRESS: u8 = 100;

/// Typical end-to-end duration of a generation call, used for ETAs.
pub const ESTIMATED_TOTAL_SECS: i64 = 30;

/// ETA reported once a task has outlived [`ESTIMATED_TOTAL_SECS`].
pub const OVERDUE_ESTIMATE_SECS: i64 = 15;

/// One submitted unit of work.
///
/// The task registry owns the canonical copy; everything handed out is a
/// snapshot taken under the registry lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub owner_id: OwnerId,
    pub status: TaskStatus,
    /// 0..=100, never decreasing while active, frozen once terminal.
    pub progress: u8,
    /// Set only on `Completed`.
    pub result: Option<serde_json::Value>,
    /// Set only on `Failed` and `TimedOut`.
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    #[serde(rename = "timeout_seconds", with = "duration_secs")]
    pub timeout_budget: Duration,
}

impl TaskRecord {
    /// A fresh `Pending` record with a newly generated id.
    pub fn new(owner_id: OwnerId, timeout_budget: Duration, now: Timestamp) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            owner_id,
            status: TaskStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            timeout_budget,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock execution time in seconds.
    ///
    /// Measured from `started_at` (or `created_at` for tasks cancelled
    /// before pickup) to `completed_at`, or to `now` while still running.
    pub fn elapsed_seconds(&self, now: Timestamp) -> f64 {
        let from = self.started_at.unwrap_or(self.created_at);
        let to = self.completed_at.unwrap_or(now);
        let millis = (to - from).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }

    /// Estimated seconds until completion, `None` once terminal.
    pub fn estimated_remaining_secs(&self, now: Timestamp) -> Option<i64> {
        if self.is_terminal() {
            return None;
        }
        let waited = (now - self.created_at).num_seconds();
        let remaining = (ESTIMATED_TOTAL_SECS - waited).max(0);
        if remaining == 0 {
            Some(OVERDUE_ESTIMATE_SECS)
        } else {
            Some(remaining)
        }
    }
}

/// Human-readable rendering of a timeout budget, e.g. `1 second`,
/// `300 seconds`, `0.5 seconds`.
pub fn describe_budget(budget: Duration) -> String {
    let secs = budget.as_secs_f64();
    if secs == 1.0 {
        "1 second".to_string()
    } else {
        format!("{secs} seconds")
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;

    fn pending_record() -> TaskRecord {
        TaskRecord::new(42, Duration::from_secs(300), Utc::now())
    }

    #[test]
    fn new_record_is_pending_and_empty() {
        let record = pending_record();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.progress, 0);
        assert!(record.result.is_none());
        assert!(record.error.is_none());
        assert!(record.started_at.is_none());
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn new_records_get_distinct_ids() {
        assert_ne!(pending_record().id, pending_record().id);
    }

    #[test]
    fn eta_counts_down_from_submission() {
        let mut record = pending_record();
        let now = Utc::now();
        record.created_at = now - ChronoDuration::seconds(10);
        assert_eq!(record.estimated_remaining_secs(now), Some(20));
    }

    #[test]
    fn eta_falls_back_once_overdue() {
        let mut record = pending_record();
        let now = Utc::now();
        record.created_at = now - ChronoDuration::seconds(90);
        assert_eq!(
            record.estimated_remaining_secs(now),
            Some(OVERDUE_ESTIMATE_SECS)
        );
    }

    #[test]
    fn terminal_record_has_no_eta() {
        let mut record = pending_record();
        record.status = TaskStatus::Completed;
        assert_eq!(record.estimated_remaining_secs(Utc::now()), None);
    }

    #[test]
    fn elapsed_runs_from_start_to_completion() {
        let mut record = pending_record();
        let start = Utc::now();
        record.started_at = Some(start);
        record.completed_at = Some(start + ChronoDuration::milliseconds(2500));
        assert_eq!(record.elapsed_seconds(Utc::now()), 2.5);
    }

    #[test]
    fn budget_descriptions() {
        assert_eq!(describe_budget(Duration::from_secs(1)), "1 second");
        assert_eq!(describe_budget(Duration::from_secs(300)), "300 seconds");
        assert_eq!(describe_budget(Duration::from_millis(500)), "0.5 seconds");
    }

    #[test]
    fn budget_serializes_as_seconds() {
        let record = pending_record();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["timeout_seconds"], 300.0);
        assert_eq!(json["status"], "pending");

        let back: TaskRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.timeout_budget, Duration::from_secs(300));
    }
}
