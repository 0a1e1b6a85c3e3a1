//! Aggregate run outcome shared by the coordinator and the stream client.

use serde::{Deserialize, Serialize};

/// Final status reported by the `complete` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Completed,
    CompletedWithErrors,
}

impl RunStatus {
    pub fn from_failed(failed: u64) -> Self {
        if failed == 0 {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters and status carried by the `complete` event. The status travels
/// with the counters so receivers report what the server decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub successful_hosts: u64,
    #[serde(default)]
    pub status: RunStatus,
}

impl RunSummary {
    /// Summary whose status is derived from the failed count.
    pub fn from_counts(total: u64, completed: u64, failed: u64, successful_hosts: u64) -> Self {
        Self {
            total,
            completed,
            failed,
            successful_hosts,
            status: RunStatus::from_failed(failed),
        }
    }
}
