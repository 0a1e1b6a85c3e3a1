use chrono::{DateTime, Utc};
use hostrun_core::state::RunSummary;
use hostrun_core::types::ProjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTopic {
    RunCompleted,
    RunCompletedWithErrors,
    RunFailed,
    /// The stream closed before delivering a single event.
    ExecutionFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub at: DateTime<Utc>,
    pub topic: NotificationTopic,
    pub severity: NotificationSeverity,
    pub title: String,
    pub body: String,
    pub project_id: Option<ProjectId>,
}

/// How a project run ended, as seen by whoever reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Failed { reason: String },
    ExecutionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSinkKind {
    Stdout,
    Tracing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPolicy {
    pub enabled_sinks: Vec<NotificationSinkKind>,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            enabled_sinks: vec![NotificationSinkKind::Stdout],
        }
    }
}
