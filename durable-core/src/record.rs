//! Persisted step execution records.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Reserved type tag meaning "the step produced no value".
///
/// Stored in place of a real tag when a step's result serializes to
/// JSON null; decodes back to the absent value on replay.
pub const NO_VALUE_TAG: &str = "<none>";

/// Lifecycle status of a persisted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// A run currently holds the lease and is (or was) executing the step.
    Running,
    /// The step finished and its payload is cached.
    Completed,
    /// The step's work raised; the error message is recorded.
    Failed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Running => "RUNNING",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(StepStatus::Running),
            "COMPLETED" => Some(StepStatus::Completed),
            "FAILED" => Some(StepStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the step table, keyed externally by (workflow id, step key).
///
/// Exactly one record exists per key. Its status only changes under a
/// matching, currently-held lease, except when a new lease reclaims a
/// stale or failed row.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub status: StepStatus,
    /// Run id that currently owns or produced this record.
    pub run_id: String,
    /// Type tag of the cached payload; [`NO_VALUE_TAG`] for absent results.
    pub output_tag: Option<String>,
    /// Serialized payload, absent for no-value results.
    pub output_json: Option<String>,
    /// Failure description, set only while status is `Failed`.
    pub error: Option<String>,
    /// Wall-clock milliseconds of the last transition; drives zombie detection.
    pub updated_at_ms: i64,
}

impl StepRecord {
    /// A fresh RUNNING record owned by `run_id`.
    pub fn running(run_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            status: StepStatus::Running,
            run_id: run_id.into(),
            output_tag: None,
            output_json: None,
            error: None,
            updated_at_ms: now_ms,
        }
    }
}

/// Current wall clock in epoch milliseconds, the record timestamp base.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [StepStatus::Running, StepStatus::Completed, StepStatus::Failed] {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(StepStatus::parse("PENDING"), None);
    }

    #[test]
    fn fresh_record_is_running_and_empty() {
        let rec = StepRecord::running("run-1", 42);
        assert_eq!(rec.status, StepStatus::Running);
        assert_eq!(rec.run_id, "run-1");
        assert!(rec.output_tag.is_none());
        assert!(rec.output_json.is_none());
        assert!(rec.error.is_none());
        assert_eq!(rec.updated_at_ms, 42);
    }
}
