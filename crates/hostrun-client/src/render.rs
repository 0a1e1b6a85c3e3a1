//! Human-readable lines for the execution log.

use hostrun_core::error_codes::{render, ErrorInfo};
use hostrun_core::events::StreamEvent;

use crate::state::{ReconciledState, RunPhase, TerminalOutcome};

pub fn render_event(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Info { message } => message.clone(),
        StreamEvent::TaskStart { host_name } => format!("[{host_name}] started"),
        StreamEvent::CheckNetwork(_) | StreamEvent::CheckLogin(_) | StreamEvent::CheckSudo(_) => {
            let Some((kind, report)) = event.as_check() else {
                return String::new();
            };
            let verdict = if report.success { "ok" } else { "failed" };
            let mut line = format!(
                "[{}] {} check {verdict}: {}",
                report.host_name,
                kind.as_str(),
                report.message
            );
            if let Some(info) = &report.error_info {
                line.push_str(&format!(" ({})", explain(info)));
            }
            line
        }
        StreamEvent::ScriptProgress {
            host_name,
            completed,
            total,
        } => format!("[{host_name}] scripts {completed}/{total}"),
        StreamEvent::TaskComplete { host_name, success } => {
            if *success {
                format!("[{host_name}] finished")
            } else {
                format!("[{host_name}] finished with errors")
            }
        }
        StreamEvent::TaskError {
            host_name,
            error,
            error_info,
        } => match error_info {
            Some(info) => format!("[{host_name}] error: {error} ({})", explain(info)),
            None => format!("[{host_name}] error: {}", render(error)),
        },
        StreamEvent::Complete {
            total,
            completed,
            failed,
            status,
            ..
        } => format!("run {status}: {completed}/{total} completed, {failed} failed"),
        StreamEvent::Error { message } => format!("run failed: {}", render(message)),
    }
}

fn explain(info: &ErrorInfo) -> String {
    format!("{}: {} [{}]", info.error, info.description, info.category)
}

/// Entries of `next` that differ from what was already shown from `prev`.
/// A collapsed progress entry shows up again as changed.
pub fn changed_entries<'a>(prev: &[StreamEvent], next: &'a [StreamEvent]) -> &'a [StreamEvent] {
    let common = prev
        .iter()
        .zip(next)
        .take_while(|(before, after)| before == after)
        .count();
    &next[common..]
}

pub fn render_summary(state: &ReconciledState) -> String {
    let outcome = match state.phase {
        RunPhase::Terminal(TerminalOutcome::Completed) => "completed",
        RunPhase::Terminal(TerminalOutcome::Failed) => "failed",
        RunPhase::Streaming => "cancelled",
        RunPhase::Idle | RunPhase::Connecting => "not started",
    };
    format!(
        "{outcome}: total {} / completed {} / failed {}",
        state.stats.total, state.stats.completed, state.stats.failed
    )
}
