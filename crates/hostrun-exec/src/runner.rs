//! Drives a project's task graph across hosts and reports progress as stream events.
//!
//! Hosts run concurrently (bounded by `max_parallel_hosts`); everything for a
//! single host runs inside one task, so events of one host always reach the
//! channel in check → (task_error | script_progress* → task_complete) order.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use hostrun_core::error_codes::resolve;
use hostrun_core::events::{CheckKind, CheckReport, StreamEvent};
use hostrun_core::state::{RunStatus, RunSummary};
use hostrun_core::types::{Execution, ExecutionStatus, Host, Script, SessionId, TaskGraph};
use hostrun_core::validation::{render_errors, Validate};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::ExecError;
use crate::store::ExecutionStore;
use crate::types::HostTransport;

#[derive(Clone)]
pub struct Coordinator {
    transport: Arc<dyn HostTransport>,
    store: Arc<dyn ExecutionStore>,
    max_parallel_hosts: usize,
}

struct HostContext {
    transport: Arc<dyn HostTransport>,
    store: Arc<dyn ExecutionStore>,
    session_id: SessionId,
    events: mpsc::Sender<StreamEvent>,
}

struct HostJob {
    host: Host,
    tasks: Vec<Vec<ScriptJob>>,
}

struct ScriptJob {
    script: Script,
    reference: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct HostOutcome {
    reachable: bool,
    completed_tasks: u64,
    success: bool,
}

impl Coordinator {
    pub fn new(
        transport: Arc<dyn HostTransport>,
        store: Arc<dyn ExecutionStore>,
        max_parallel_hosts: usize,
    ) -> Self {
        Self {
            transport,
            store,
            max_parallel_hosts: max_parallel_hosts.max(1),
        }
    }

    /// Runs every task of `graph`, pushing events into `events`. Exactly one
    /// terminal event (`complete` or `error`) is sent last.
    pub async fn run(
        &self,
        graph: &TaskGraph,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<RunSummary, ExecError> {
        let project_id = graph.project_id.to_string();

        if let Some(message) = render_errors(&graph.validate()) {
            let err = ExecError::InvalidGraph {
                project_id,
                message,
            };
            warn!(error = %err, "refusing to run project");
            emit(&events, StreamEvent::Error {
                message: err.to_string(),
            })
            .await;
            return Err(err);
        }

        let session = match self.store.open_session(&graph.project_id).await {
            Ok(session) => session,
            Err(err) => {
                error!(project_id = %project_id, error = %err, "failed to open execution session");
                emit(&events, StreamEvent::Error {
                    message: err.to_string(),
                })
                .await;
                return Err(err);
            }
        };

        let total = graph.task_count();
        let jobs = build_jobs(graph);
        info!(
            project_id = %project_id,
            session_id = %session.session_id,
            hosts = jobs.len(),
            tasks = total,
            "starting project run"
        );

        let display_name = if graph.name.is_empty() {
            project_id.as_str()
        } else {
            graph.name.as_str()
        };
        emit(&events, StreamEvent::info_for_total(display_name, total)).await;

        let context = Arc::new(HostContext {
            transport: self.transport.clone(),
            store: self.store.clone(),
            session_id: session.session_id.clone(),
            events: events.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_hosts));
        let mut running = JoinSet::new();
        for job in jobs {
            let context = context.clone();
            let semaphore = semaphore.clone();
            running.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                run_host(&context, job).await
            });
        }

        let mut summary = RunSummary {
            total: total as u64,
            ..RunSummary::default()
        };
        let mut reachable_hosts = 0u64;
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(outcome) => {
                    reachable_hosts += u64::from(outcome.reachable);
                    summary.completed += outcome.completed_tasks;
                    summary.successful_hosts += u64::from(outcome.success);
                }
                Err(err) => error!(project_id = %project_id, error = %err, "host task aborted"),
            }
        }
        summary.failed = summary.total.saturating_sub(summary.completed);
        summary.status = RunStatus::from_failed(summary.failed);

        if reachable_hosts == 0 {
            let err = ExecError::NoReachableHosts { project_id };
            warn!(session_id = %session.session_id, "{err}");
            emit(&events, StreamEvent::Error {
                message: err.to_string(),
            })
            .await;
            return Err(err);
        }

        info!(
            project_id = %project_id,
            session_id = %session.session_id,
            completed = summary.completed,
            failed = summary.failed,
            successful_hosts = summary.successful_hosts,
            "project run finished"
        );
        emit(&events, StreamEvent::Complete {
            total: summary.total,
            completed: summary.completed,
            failed: summary.failed,
            successful_hosts: Some(summary.successful_hosts),
            status: summary.status,
        })
        .await;
        Ok(summary)
    }
}

/// Flattens the graph into per-host jobs. A script selected by more than one
/// task on the same host runs once, under the first task that selects it.
fn build_jobs(graph: &TaskGraph) -> Vec<HostJob> {
    graph
        .host_plans()
        .into_iter()
        .map(|plan| {
            let mut scheduled = HashSet::new();
            let tasks = plan
                .tasks
                .iter()
                .map(|task| {
                    task.script_ids
                        .iter()
                        .filter(|script_id| scheduled.insert((*script_id).clone()))
                        .filter_map(|script_id| graph.script(script_id))
                        .map(|script| ScriptJob {
                            script: script.clone(),
                            reference: task.reference_for(&script.id).map(str::to_string),
                        })
                        .collect()
                })
                .collect();
            HostJob {
                host: plan.host.clone(),
                tasks,
            }
        })
        .collect()
}

async fn run_host(context: &HostContext, job: HostJob) -> HostOutcome {
    let host_name = job.host.name.clone();
    emit(&context.events, StreamEvent::TaskStart {
        host_name: host_name.clone(),
    })
    .await;

    let mut checks = vec![CheckKind::Network, CheckKind::Login];
    if job.host.os.requires_sudo_check() {
        checks.push(CheckKind::Sudo);
    }

    for kind in checks {
        let outcome = context.transport.check(kind, &job.host).await;
        let error_info = if outcome.success {
            None
        } else {
            resolve(&outcome.detail).or_else(|| resolve(&outcome.message))
        };
        emit(
            &context.events,
            StreamEvent::check(
                kind,
                CheckReport {
                    host_name: host_name.clone(),
                    success: outcome.success,
                    message: outcome.message.clone(),
                    error_info: error_info.clone(),
                },
            ),
        )
        .await;

        if !outcome.success {
            info!(host = %host_name, check = kind.as_str(), "host check failed; skipping scripts");
            emit(&context.events, StreamEvent::TaskError {
                host_name: host_name.clone(),
                error: format!("{} check failed: {}", kind.as_str(), outcome.message),
                error_info,
            })
            .await;
            return HostOutcome {
                reachable: kind != CheckKind::Network,
                ..HostOutcome::default()
            };
        }
    }

    let total = job.tasks.iter().map(Vec::len).sum::<usize>() as u64;
    let mut completed = 0u64;
    emit(&context.events, StreamEvent::ScriptProgress {
        host_name: host_name.clone(),
        completed,
        total,
    })
    .await;

    let mut outcome = HostOutcome {
        reachable: true,
        completed_tasks: 0,
        success: true,
    };
    for scripts in &job.tasks {
        let mut task_ok = true;
        for script_job in scripts {
            let status = run_script(context, &job.host, script_job).await;
            if status.is_error() {
                task_ok = false;
                outcome.success = false;
            }
            completed += 1;
            emit(&context.events, StreamEvent::ScriptProgress {
                host_name: host_name.clone(),
                completed,
                total,
            })
            .await;
        }
        outcome.completed_tasks += u64::from(task_ok);
    }

    emit(&context.events, StreamEvent::TaskComplete {
        host_name,
        success: outcome.success,
    })
    .await;
    outcome
}

async fn run_script(context: &HostContext, host: &Host, job: &ScriptJob) -> ExecutionStatus {
    let result = context
        .transport
        .run_script(host, &job.script, job.reference.as_deref())
        .await;
    let (status, output, error) = match result {
        Ok(output) => (
            ExecutionStatus::from_exit_code(output.exit_code),
            output.stdout,
            output.stderr,
        ),
        Err(err) => (ExecutionStatus::Error, String::new(), err.to_string()),
    };
    debug!(host = %host.name, script = %job.script.id, status = %status, "script finished");

    let execution = Execution {
        session_id: context.session_id.clone(),
        host_id: host.id.clone(),
        script_id: job.script.id.clone(),
        status,
        output,
        error,
        executed_at: Utc::now(),
    };
    if let Err(err) = context.store.record(execution).await {
        warn!(host = %host.name, script = %job.script.id, error = %err, "failed to record execution");
    }
    status
}

async fn emit(events: &mpsc::Sender<StreamEvent>, event: StreamEvent) {
    if events.send(event).await.is_err() {
        debug!("stream receiver closed; continuing without client");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryExecutionStore;
    use crate::types::{CheckOutcome, ScriptOutput};
    use async_trait::async_trait;
    use hostrun_core::types::{HostId, OsFamily, ProjectId, ScriptId, SystemId, Task};
    use std::collections::{BTreeMap, BTreeSet, HashMap};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        failing_checks: HashMap<String, (CheckKind, String)>,
        exit_codes: HashMap<String, i32>,
        transport_errors: Vec<String>,
        seen_references: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl HostTransport for FakeTransport {
        async fn check(&self, kind: CheckKind, host: &Host) -> CheckOutcome {
            match self.failing_checks.get(&host.name) {
                Some((failing, detail)) if *failing == kind => {
                    CheckOutcome::failed(format!("{} failed", kind.as_str()), detail.clone())
                }
                _ => CheckOutcome::passed("ok"),
            }
        }

        async fn run_script(
            &self,
            host: &Host,
            script: &Script,
            reference: Option<&str>,
        ) -> Result<ScriptOutput, ExecError> {
            self.seen_references
                .lock()
                .expect("references lock")
                .push((script.id.0.clone(), reference.map(str::to_string)));
            if self.transport_errors.contains(&script.id.0) {
                return Err(ExecError::Io {
                    host: host.name.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "reset"),
                });
            }
            Ok(ScriptOutput {
                exit_code: Some(self.exit_codes.get(&script.id.0).copied().unwrap_or(0)),
                stdout: format!("{} output", script.id),
                stderr: String::new(),
            })
        }
    }

    fn host(name: &str, os: OsFamily) -> Host {
        Host {
            id: HostId::new(name),
            name: name.to_string(),
            address: "10.0.0.1".to_string(),
            port: 22,
            os,
            username: None,
        }
    }

    fn script(id: &str) -> Script {
        Script {
            id: ScriptId::new(id),
            name: id.to_string(),
            command: format!("run-{id}"),
        }
    }

    fn task(host: &str, system: &str, scripts: &[&str]) -> Task {
        Task {
            host_id: HostId::new(host),
            system_id: SystemId::new(system),
            script_ids: scripts.iter().map(|id| ScriptId::new(*id)).collect::<BTreeSet<_>>(),
            reference_data: BTreeMap::new(),
        }
    }

    fn graph(hosts: Vec<Host>, tasks: Vec<Task>) -> TaskGraph {
        TaskGraph {
            project_id: ProjectId::new("P1"),
            name: "audit".to_string(),
            hosts,
            scripts: vec![script("a"), script("b"), script("c")],
            tasks,
        }
    }

    async fn run_collect(
        transport: FakeTransport,
        graph: &TaskGraph,
    ) -> (Result<RunSummary, ExecError>, Vec<StreamEvent>, MemoryExecutionStore) {
        let store = MemoryExecutionStore::default();
        let coordinator = Coordinator::new(Arc::new(transport), Arc::new(store.clone()), 4);
        let (tx, mut rx) = mpsc::channel(256);
        let result = coordinator.run(graph, tx).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (result, events, store)
    }

    fn names(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(hostrun_core::events::event_name).collect()
    }

    #[tokio::test]
    async fn linux_host_runs_all_checks_then_scripts_in_order() {
        let graph = graph(
            vec![host("h1", OsFamily::Linux)],
            vec![task("h1", "base", &["a", "b"])],
        );

        let (result, events, store) = run_collect(FakeTransport::default(), &graph).await;
        let summary = result.expect("run succeeds");

        assert_eq!(
            names(&events),
            vec![
                "info",
                "task_start",
                "check_network",
                "check_login",
                "check_sudo",
                "script_progress",
                "script_progress",
                "script_progress",
                "task_complete",
                "complete",
            ]
        );
        let StreamEvent::Info { message } = &events[0] else {
            panic!("first event must be info");
        };
        assert_eq!(hostrun_core::events::parse_total_tasks(message), Some(1));
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Complete {
                total: 1,
                completed: 1,
                failed: 0,
                successful_hosts: Some(1),
                status: RunStatus::Completed,
            })
        );
        assert_eq!(summary.completed, 1);

        let sessions = store.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(store.executions(&sessions[0].session_id).await.len(), 2);
    }

    #[tokio::test]
    async fn windows_host_skips_sudo_check() {
        let graph = graph(
            vec![host("win", OsFamily::Windows)],
            vec![task("win", "base", &["a"])],
        );

        let (_, events, _) = run_collect(FakeTransport::default(), &graph).await;
        assert!(!names(&events).contains(&"check_sudo"));
        assert!(names(&events).contains(&"check_login"));
    }

    #[tokio::test]
    async fn failed_check_emits_task_error_and_skips_scripts() {
        let mut transport = FakeTransport::default();
        transport
            .failing_checks
            .insert("h2".to_string(), (CheckKind::Login, "Permission denied\nexit code 255".to_string()));
        let graph = graph(
            vec![host("h1", OsFamily::Linux), host("h2", OsFamily::Linux)],
            vec![task("h1", "base", &["a"]), task("h2", "base", &["a", "b"])],
        );

        let (result, events, store) = run_collect(transport, &graph).await;
        let summary = result.expect("one host still ran");

        let h2 = events
            .iter()
            .filter(|event| event.host_name() == Some("h2"))
            .collect::<Vec<_>>();
        assert_eq!(
            h2.iter().map(|event| hostrun_core::events::event_name(event)).collect::<Vec<_>>(),
            vec!["task_start", "check_network", "check_login", "task_error"]
        );
        let StreamEvent::TaskError { error_info, .. } = h2[3] else {
            panic!("expected task_error");
        };
        assert_eq!(
            error_info.as_ref().map(|info| info.error.as_str()),
            Some("Remote connection failed")
        );

        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.successful_hosts, 1);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Complete {
                status: RunStatus::CompletedWithErrors,
                ..
            })
        ));

        let sessions = store.sessions().await;
        let executions = store.executions(&sessions[0].session_id).await;
        assert!(executions.iter().all(|execution| execution.host_id == HostId::new("h1")));
    }

    #[tokio::test]
    async fn unreachable_hosts_end_with_error_event() {
        let mut transport = FakeTransport::default();
        for name in ["h1", "h2"] {
            transport
                .failing_checks
                .insert(name.to_string(), (CheckKind::Network, "connection refused".to_string()));
        }
        let graph = graph(
            vec![host("h1", OsFamily::Linux), host("h2", OsFamily::Windows)],
            vec![task("h1", "base", &["a"]), task("h2", "base", &["a"])],
        );

        let (result, events, _) = run_collect(transport, &graph).await;
        assert!(matches!(result, Err(ExecError::NoReachableHosts { .. })));
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
        assert!(!names(&events).contains(&"complete"));
    }

    #[tokio::test]
    async fn invalid_graph_fails_fast_with_single_error_event() {
        let graph = graph(
            vec![host("h1", OsFamily::Linux)],
            vec![task("h1", "base", &[])],
        );

        let (result, events, store) = run_collect(FakeTransport::default(), &graph).await;
        assert!(matches!(result, Err(ExecError::InvalidGraph { .. })));
        assert_eq!(names(&events), vec!["error"]);
        assert!(store.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn script_statuses_drive_task_and_host_success() {
        let mut transport = FakeTransport::default();
        transport.exit_codes.insert("a".to_string(), 1);
        transport.exit_codes.insert("b".to_string(), 2);
        transport.transport_errors.push("c".to_string());
        let graph = graph(
            vec![host("h1", OsFamily::Linux), host("h2", OsFamily::Linux)],
            vec![
                task("h1", "base", &["a", "b"]),
                task("h2", "base", &["a"]),
                task("h2", "extra", &["c"]),
            ],
        );

        let (result, events, store) = run_collect(transport, &graph).await;
        let summary = result.expect("run completes");

        assert!(events.contains(&StreamEvent::TaskComplete {
            host_name: "h1".to_string(),
            success: true,
        }));
        assert!(events.contains(&StreamEvent::TaskComplete {
            host_name: "h2".to_string(),
            success: false,
        }));
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.successful_hosts, 1);

        let session = &store.sessions().await[0];
        let executions = store.executions(&session.session_id).await;
        let status_of = |host: &str, script: &str| {
            executions
                .iter()
                .find(|execution| {
                    execution.host_id == HostId::new(host) && execution.script_id == ScriptId::new(script)
                })
                .map(|execution| execution.status)
        };
        assert_eq!(status_of("h1", "a"), Some(ExecutionStatus::Failed));
        assert_eq!(status_of("h1", "b"), Some(ExecutionStatus::Operator));
        assert_eq!(status_of("h2", "c"), Some(ExecutionStatus::Error));
    }

    #[tokio::test]
    async fn per_host_events_keep_protocol_order_under_parallelism() {
        let hosts = (0..6)
            .map(|index| host(&format!("h{index}"), OsFamily::Linux))
            .collect::<Vec<_>>();
        let tasks = (0..6)
            .map(|index| task(&format!("h{index}"), "base", &["a", "b", "c"]))
            .collect::<Vec<_>>();
        let graph = graph(hosts, tasks);

        let (_, events, _) = run_collect(FakeTransport::default(), &graph).await;
        for index in 0..6 {
            let name = format!("h{index}");
            let progress = events
                .iter()
                .filter_map(|event| match event {
                    StreamEvent::ScriptProgress {
                        host_name,
                        completed,
                        total,
                    } if *host_name == name => Some((*completed, *total)),
                    _ => None,
                })
                .collect::<Vec<_>>();
            assert_eq!(progress, vec![(0, 3), (1, 3), (2, 3), (3, 3)]);

            let kinds = events
                .iter()
                .filter(|event| event.host_name() == Some(name.as_str()))
                .map(hostrun_core::events::event_name)
                .collect::<Vec<_>>();
            assert_eq!(kinds.first(), Some(&"task_start"));
            assert_eq!(kinds.last(), Some(&"task_complete"));
        }
    }

    #[tokio::test]
    async fn reference_data_is_passed_to_matching_script() {
        let transport = Arc::new(FakeTransport::default());
        let mut task = task("h1", "base", &["a", "b"]);
        task.reference_data
            .insert(ScriptId::new("b"), "expected".to_string());
        let graph = graph(vec![host("h1", OsFamily::Linux)], vec![task]);

        let coordinator =
            Coordinator::new(transport.clone(), Arc::new(MemoryExecutionStore::default()), 1);
        let (tx, _rx) = mpsc::channel(64);
        coordinator.run(&graph, tx).await.expect("run");

        let seen = transport.seen_references.lock().expect("references lock").clone();
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), None),
                ("b".to_string(), Some("expected".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_stop_remote_work() {
        let graph = graph(
            vec![host("h1", OsFamily::Linux)],
            vec![task("h1", "base", &["a", "b", "c"])],
        );
        let store = MemoryExecutionStore::default();
        let coordinator = Coordinator::new(
            Arc::new(FakeTransport::default()),
            Arc::new(store.clone()),
            2,
        );
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let summary = coordinator.run(&graph, tx).await.expect("run completes");
        assert_eq!(summary.completed, 1);
        let session = &store.sessions().await[0];
        assert_eq!(store.executions(&session.session_id).await.len(), 3);
    }
    #[tokio::test]
    async fn script_shared_by_two_tasks_on_one_host_runs_once() {
        let graph = graph(
            vec![host("h1", OsFamily::Windows)],
            vec![task("h1", "base", &["a", "b"]), task("h1", "extra", &["b", "c"])],
        );
        let transport = Arc::new(FakeTransport::default());
        let store = MemoryExecutionStore::default();
        let coordinator = Coordinator::new(transport.clone(), Arc::new(store.clone()), 1);
        let (tx, mut rx) = mpsc::channel(64);

        let summary = coordinator.run(&graph, tx).await.expect("run");
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let ran = transport
            .seen_references
            .lock()
            .expect("references lock")
            .iter()
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        assert_eq!(ran, vec!["a", "b", "c"]);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 0);

        let session = &store.sessions().await[0];
        assert_eq!(store.executions(&session.session_id).await.len(), 3);
        assert!(events.contains(&StreamEvent::ScriptProgress {
            host_name: "h1".to_string(),
            completed: 3,
            total: 3,
        }));
    }
}
