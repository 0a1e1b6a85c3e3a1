//! Core types for project execution: identifiers, task graph and execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(ProjectId);
string_id!(HostId);
string_id!(SystemId);
string_id!(ScriptId);
string_id!(SessionId);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Operating system family of a host. Decides the connection kind and
/// whether the privilege check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    #[default]
    Linux,
    Windows,
}

impl OsFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Windows => "windows",
        }
    }

    pub fn requires_sudo_check(self) -> bool {
        matches!(self, OsFamily::Linux)
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub os: OsFamily,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub id: ScriptId,
    pub name: String,
    /// Command line executed on the host.
    pub command: String,
}

/// One system's selected scripts assigned to one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub host_id: HostId,
    pub system_id: SystemId,
    #[serde(default)]
    pub script_ids: BTreeSet<ScriptId>,
    #[serde(default)]
    pub reference_data: BTreeMap<ScriptId, String>,
}

impl Task {
    pub fn reference_for(&self, script_id: &ScriptId) -> Option<&str> {
        self.reference_data.get(script_id).map(String::as_str)
    }
}

/// The full unit of work for a project run, plus the host and script
/// catalogs its tasks refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub project_id: ProjectId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub scripts: Vec<Script>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Tasks grouped under the host they run on, in first-appearance order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlan<'a> {
    pub host: &'a Host,
    pub tasks: Vec<&'a Task>,
}

impl TaskGraph {
    pub fn for_each_task(&self) -> impl Iterator<Item = &Task> + '_ {
        self.tasks.iter()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn host(&self, id: &HostId) -> Option<&Host> {
        self.hosts.iter().find(|host| &host.id == id)
    }

    pub fn script(&self, id: &ScriptId) -> Option<&Script> {
        self.scripts.iter().find(|script| &script.id == id)
    }

    /// Groups tasks per host. Tasks whose host is missing from the catalog are
    /// skipped; validation reports them before a run starts.
    pub fn host_plans(&self) -> Vec<HostPlan<'_>> {
        let mut plans: Vec<HostPlan<'_>> = Vec::new();
        for task in &self.tasks {
            let Some(host) = self.host(&task.host_id) else {
                continue;
            };
            match plans.iter_mut().find(|plan| plan.host.id == host.id) {
                Some(plan) => plan.tasks.push(task),
                None => plans.push(HostPlan {
                    host,
                    tasks: vec![task],
                }),
            }
        }
        plans
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSession {
    pub session_id: SessionId,
    pub project_id: ProjectId,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionSession {
    pub fn start(project_id: ProjectId) -> Self {
        Self {
            session_id: SessionId::generate(),
            project_id,
            executed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Passed,
    Failed,
    /// The script could not decide on its own; an operator must review it.
    Operator,
    Error,
}

impl ExecutionStatus {
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExecutionStatus::Passed,
            Some(1) => ExecutionStatus::Failed,
            Some(2) => ExecutionStatus::Operator,
            _ => ExecutionStatus::Error,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, ExecutionStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Passed => "passed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Operator => "operator",
            ExecutionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one script on one host within a session. Never mutated after
/// it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub session_id: SessionId,
    pub host_id: HostId,
    pub script_id: ScriptId,
    pub status: ExecutionStatus,
    pub output: String,
    pub error: String,
    pub executed_at: DateTime<Utc>,
}

fn default_port() -> u16 {
    22
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(id: &str) -> Host {
        Host {
            id: HostId::new(id),
            name: format!("{id}.example"),
            address: "10.0.0.1".to_string(),
            port: 22,
            os: OsFamily::Linux,
            username: None,
        }
    }

    fn task(host_id: &str, system_id: &str, scripts: &[&str]) -> Task {
        Task {
            host_id: HostId::new(host_id),
            system_id: SystemId::new(system_id),
            script_ids: scripts.iter().map(|id| ScriptId::new(*id)).collect(),
            reference_data: BTreeMap::new(),
        }
    }

    #[test]
    fn host_plans_group_tasks_in_first_appearance_order() {
        let graph = TaskGraph {
            project_id: ProjectId::new("P1"),
            name: "audit".to_string(),
            hosts: vec![host("h1"), host("h2")],
            scripts: Vec::new(),
            tasks: vec![
                task("h2", "s1", &["a"]),
                task("h1", "s1", &["a", "b"]),
                task("h2", "s2", &["c"]),
            ],
        };

        let plans = graph.host_plans();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].host.id, HostId::new("h2"));
        assert_eq!(plans[0].tasks.len(), 2);
        assert_eq!(plans[1].host.id, HostId::new("h1"));
        assert_eq!(plans[1].tasks.len(), 1);
    }

    #[test]
    fn host_plans_skip_tasks_with_unknown_hosts() {
        let graph = TaskGraph {
            project_id: ProjectId::new("P1"),
            name: String::new(),
            hosts: vec![host("h1")],
            scripts: Vec::new(),
            tasks: vec![task("ghost", "s1", &["a"]), task("h1", "s1", &["a"])],
        };

        let plans = graph.host_plans();
        assert_eq!(plans.len(), 1);
        assert_eq!(graph.task_count(), 2);
    }

    #[test]
    fn execution_status_maps_exit_codes() {
        assert_eq!(ExecutionStatus::from_exit_code(Some(0)), ExecutionStatus::Passed);
        assert_eq!(ExecutionStatus::from_exit_code(Some(1)), ExecutionStatus::Failed);
        assert_eq!(ExecutionStatus::from_exit_code(Some(2)), ExecutionStatus::Operator);
        assert_eq!(ExecutionStatus::from_exit_code(Some(127)), ExecutionStatus::Error);
        assert_eq!(ExecutionStatus::from_exit_code(None), ExecutionStatus::Error);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&HostId::new("h1")).unwrap();
        assert_eq!(json, "\"h1\"");
        assert_eq!(format!("{}", ScriptId::new("sc")), "sc");
    }

    #[test]
    fn task_graph_parses_from_toml_with_defaults() {
        let graph: TaskGraph = toml::from_str(
            r#"
project_id = "P7"

[[hosts]]
id = "h1"
name = "db01"
address = "192.168.1.10"
os = "windows"

[[scripts]]
id = "s1"
name = "disk"
command = "df -h"

[[tasks]]
host_id = "h1"
system_id = "storage"
script_ids = ["s1"]

[tasks.reference_data]
s1 = "80%"
"#,
        )
        .expect("parse graph");

        assert_eq!(graph.hosts[0].port, 22);
        assert_eq!(graph.hosts[0].os, OsFamily::Windows);
        assert_eq!(graph.tasks[0].reference_for(&ScriptId::new("s1")), Some("80%"));
    }

    #[test]
    fn only_linux_requires_sudo_check() {
        assert!(OsFamily::Linux.requires_sudo_check());
        assert!(!OsFamily::Windows.requires_sudo_check());
    }
}
