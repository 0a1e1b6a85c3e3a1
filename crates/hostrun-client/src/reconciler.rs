//! Async driver around [`reduce`]: pulls frames from an [`EventSource`],
//! runs the resulting effects and publishes snapshots to observers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hostrun_core::types::ProjectId;
use hostrun_notify::{notification_for_outcome, NotificationDispatcher, RunOutcome};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::decoder::SourceItem;
use crate::reduce::{reduce, Effect, StreamInput};
use crate::source::{EventSource, FailureReporter};
use crate::state::ReconciledState;

/// Stops a running reconciler. Closing is fire-and-forget: the run ends
/// where it is and no terminal transition happens.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Upper bound for a single execution-failed report.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Execution-failed reports still in flight. The reconciler never waits for
/// them; callers that are about to exit can [`settle`](Self::settle) them.
#[derive(Debug, Clone, Default)]
pub struct PendingReports {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PendingReports {
    fn track(&self, handle: JoinHandle<()>) {
        match self.handles.lock() {
            Ok(mut guard) => guard.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }

    /// Waits for every report spawned so far. Each report is bounded by the
    /// reconciler's report timeout.
    pub async fn settle(&self) {
        let handles = match self.handles.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if let Err(err) = handle.await {
                debug!(error = %err, "execution-failed report task ended abnormally");
            }
        }
    }
}

pub struct Reconciler {
    project_id: ProjectId,
    source: Box<dyn EventSource>,
    reporter: Arc<dyn FailureReporter>,
    report_timeout: Duration,
    pending: PendingReports,
    notifier: Option<Arc<NotificationDispatcher>>,
    state: ReconciledState,
    snapshots: watch::Sender<ReconciledState>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl Reconciler {
    pub fn new(
        project_id: ProjectId,
        source: Box<dyn EventSource>,
        reporter: Arc<dyn FailureReporter>,
    ) -> Self {
        let (snapshots, _) = watch::channel(ReconciledState::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            project_id,
            source,
            reporter,
            report_timeout: DEFAULT_REPORT_TIMEOUT,
            pending: PendingReports::default(),
            notifier: None,
            state: ReconciledState::default(),
            snapshots,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<NotificationDispatcher>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_report_timeout(mut self, timeout: Duration) -> Self {
        self.report_timeout = timeout;
        self
    }

    pub fn pending_reports(&self) -> PendingReports {
        self.pending.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReconciledState> {
        self.snapshots.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Drives the stream until a terminal state or cancellation and returns
    /// the final state.
    pub async fn run(mut self) -> ReconciledState {
        self.apply(StreamInput::Start).await;
        match self.source.open().await {
            Ok(()) => self.apply(StreamInput::Opened).await,
            Err(err) => {
                warn!(project_id = %self.project_id, error = %err, "failed to open execution stream");
                self.apply(StreamInput::TransportError(err.to_string())).await;
            }
        }

        let mut cancel_open = true;
        while !self.state.phase.is_terminal() {
            tokio::select! {
                biased;
                changed = self.cancel_rx.changed(), if cancel_open => {
                    if changed.is_err() {
                        cancel_open = false;
                    } else if *self.cancel_rx.borrow_and_update() {
                        info!(project_id = %self.project_id, "stream cancelled");
                        self.source.close().await;
                        break;
                    }
                }
                next = self.source.next_frame() => {
                    let input = match next {
                        Ok(Some(SourceItem::Event(event))) => StreamInput::Event(event),
                        Ok(Some(SourceItem::Malformed(err))) => {
                            warn!(project_id = %self.project_id, error = %err, "discarding malformed frame");
                            StreamInput::ProtocolError(err.to_string())
                        }
                        Ok(None) => StreamInput::Closed,
                        Err(err) => {
                            warn!(project_id = %self.project_id, error = %err, "execution stream failed");
                            StreamInput::TransportError(err.to_string())
                        }
                    };
                    self.apply(input).await;
                }
            }
        }
        self.state
    }

    /// Observers see the new state before any effect runs.
    async fn apply(&mut self, input: StreamInput) {
        let (next, effects) = reduce(std::mem::take(&mut self.state), input);
        self.state = next;
        self.snapshots.send_replace(self.state.clone());
        for effect in effects {
            self.run_effect(effect).await;
        }
    }

    async fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::CloseChannel => self.source.close().await,
            Effect::NotifySummary(summary) => {
                info!(
                    project_id = %self.project_id,
                    completed = summary.completed,
                    failed = summary.failed,
                    "run completed"
                );
                self.notify(RunOutcome::Completed(summary));
            }
            Effect::NotifyFailure { reason } => self.notify(RunOutcome::Failed { reason }),
            Effect::ReportExecutionFailed => self.spawn_report(),
        }
    }

    fn spawn_report(&self) {
        let reporter = self.reporter.clone();
        let project_id = self.project_id.clone();
        let timeout = self.report_timeout;
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, reporter.report_execution_failed(&project_id)).await {
                Ok(Ok(())) => debug!(project_id = %project_id, "execution-failed reported"),
                Ok(Err(err)) => {
                    debug!(project_id = %project_id, error = %err, "execution-failed report dropped")
                }
                Err(_) => warn!(
                    project_id = %project_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "execution-failed report timed out"
                ),
            }
        });
        self.pending.track(handle);
    }

    fn notify(&self, outcome: RunOutcome) {
        if let Some(notifier) = &self.notifier {
            notifier.dispatch(&notification_for_outcome(Some(&self.project_id), &outcome));
        }
    }
}
