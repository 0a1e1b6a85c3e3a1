//! Map run outcomes to notifications.

use chrono::Utc;
use hostrun_core::state::RunStatus;
use hostrun_core::types::ProjectId;

use crate::types::{NotificationMessage, NotificationSeverity, NotificationTopic, RunOutcome};

/// Builds the single notification reported for a finished run. Wording
/// follows the run status and the failed task count.
pub fn notification_for_outcome(
    project_id: Option<&ProjectId>,
    outcome: &RunOutcome,
) -> NotificationMessage {
    let label = project_id
        .map(|id| format!("Project {id}"))
        .unwrap_or_else(|| "Project".to_string());

    let (topic, severity, title, body) = match outcome {
        RunOutcome::Completed(summary) => match summary.status {
            RunStatus::Completed => (
                NotificationTopic::RunCompleted,
                NotificationSeverity::Info,
                format!("{label} completed"),
                format!(
                    "All {} tasks finished; {} completed.",
                    summary.total, summary.completed
                ),
            ),
            RunStatus::CompletedWithErrors => (
                NotificationTopic::RunCompletedWithErrors,
                NotificationSeverity::Warning,
                format!("{label} completed with errors"),
                format!(
                    "{} of {} tasks failed; {} completed.",
                    summary.failed, summary.total, summary.completed
                ),
            ),
        },
        RunOutcome::Failed { reason } => (
            NotificationTopic::RunFailed,
            NotificationSeverity::Error,
            format!("{label} run failed"),
            reason.clone(),
        ),
        RunOutcome::ExecutionFailed => (
            NotificationTopic::ExecutionFailed,
            NotificationSeverity::Error,
            format!("{label} execution failed"),
            "The execution stream closed before delivering any event.".to_string(),
        ),
    };

    NotificationMessage {
        at: Utc::now(),
        topic,
        severity,
        title,
        body,
        project_id: project_id.cloned(),
    }
}
