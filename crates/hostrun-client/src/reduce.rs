//! Pure transition function of the stream reconciler.
//!
//! `reduce` never performs I/O. Everything observable outside the state
//! (closing the channel, notifications, the execution-failed report) is
//! returned as an [`Effect`] for the adapter to run.

use hostrun_core::events::{parse_total_tasks, StreamEvent};
use hostrun_core::state::RunSummary;

use crate::state::{ReconciledState, RunPhase, Stats, TerminalOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamInput {
    Start,
    Opened,
    Event(StreamEvent),
    /// A frame that could not be decoded; the stream itself is still usable.
    ProtocolError(String),
    TransportError(String),
    /// The channel closed without an error.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CloseChannel,
    NotifySummary(RunSummary),
    NotifyFailure { reason: String },
    ReportExecutionFailed,
}

pub const CLOSED_EARLY_REASON: &str = "stream closed before the run finished";

pub fn reduce(mut state: ReconciledState, input: StreamInput) -> (ReconciledState, Vec<Effect>) {
    if state.phase.is_terminal() {
        return (state, Vec::new());
    }

    let mut effects = Vec::new();
    match input {
        StreamInput::Start => {
            if state.phase == RunPhase::Idle {
                state.phase = RunPhase::Connecting;
            }
        }
        StreamInput::Opened => state.phase = RunPhase::Streaming,
        StreamInput::ProtocolError(_) => state.protocol_errors += 1,
        StreamInput::TransportError(reason) => fail(&mut state, reason, &mut effects),
        StreamInput::Closed => fail(&mut state, CLOSED_EARLY_REASON.to_string(), &mut effects),
        StreamInput::Event(event) => {
            state.phase = RunPhase::Streaming;
            state.frames_received += 1;
            apply_event(&mut state, event, &mut effects);
        }
    }
    (state, effects)
}

fn apply_event(state: &mut ReconciledState, event: StreamEvent, effects: &mut Vec<Effect>) {
    match event {
        StreamEvent::Complete {
            total,
            completed,
            failed,
            successful_hosts,
            status,
        } => {
            state.flags.force();
            state.stats = Stats {
                total,
                completed,
                failed,
            };
            state.phase = RunPhase::Terminal(TerminalOutcome::Completed);
            effects.push(Effect::CloseChannel);
            effects.push(Effect::NotifySummary(RunSummary {
                total,
                completed,
                failed,
                successful_hosts: successful_hosts.unwrap_or_default(),
                status,
            }));
        }
        StreamEvent::Error { message } => fail(state, message, effects),
        StreamEvent::Info { ref message } => {
            if let Some(total) = parse_total_tasks(message) {
                state.stats.total = total;
            }
            state.log.push(event);
        }
        StreamEvent::TaskStart { .. } | StreamEvent::CheckNetwork(_) => {
            state.flags.force();
            state.log.push(event);
        }
        StreamEvent::ScriptProgress { ref host_name, .. } => {
            let collapses = matches!(
                state.log.last(),
                Some(StreamEvent::ScriptProgress { host_name: last, .. }) if last == host_name
            );
            if collapses {
                state.log.pop();
            }
            state.log.push(event);
        }
        StreamEvent::TaskError { ref host_name, .. } => {
            let already_reported = state
                .log
                .iter()
                .any(|entry| entry.is_failed_check_for(host_name));
            if !already_reported {
                state.log.push(event);
            }
        }
        StreamEvent::TaskComplete { success, .. } => {
            if success {
                state.stats.completed += 1;
            } else {
                state.stats.failed += 1;
            }
            state.log.push(event);
        }
        StreamEvent::CheckLogin(_) | StreamEvent::CheckSudo(_) => state.log.push(event),
    }
}

fn fail(state: &mut ReconciledState, reason: String, effects: &mut Vec<Effect>) {
    state.flags.force();
    state.phase = RunPhase::Terminal(TerminalOutcome::Failed);
    effects.push(Effect::CloseChannel);
    if state.log.is_empty() {
        effects.push(Effect::ReportExecutionFailed);
    }
    effects.push(Effect::NotifyFailure { reason });
}

/// Folds a whole input sequence, collecting effects in order.
pub fn reduce_all(
    state: ReconciledState,
    inputs: impl IntoIterator<Item = StreamInput>,
) -> (ReconciledState, Vec<Effect>) {
    inputs
        .into_iter()
        .fold((state, Vec::new()), |(state, mut effects), input| {
            let (next, produced) = reduce(state, input);
            effects.extend(produced);
            (next, effects)
        })
}
