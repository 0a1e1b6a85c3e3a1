//! Validation of configuration and task graphs before a run starts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::AppConfig;
use crate::types::TaskGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

impl ValidationIssue {
    fn error(code: &'static str, message: String) -> Self {
        Self {
            level: ValidationLevel::Error,
            code,
            message,
        }
    }

    fn warning(code: &'static str, message: String) -> Self {
        Self {
            level: ValidationLevel::Warning,
            code,
            message,
        }
    }
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

/// Joins error-level issues into one line, `None` when there are none.
pub fn render_errors(issues: &[ValidationIssue]) -> Option<String> {
    let rendered = issues
        .iter()
        .filter(|issue| issue.level == ValidationLevel::Error)
        .map(|issue| format!("{}: {}", issue.code, issue.message))
        .collect::<Vec<_>>();
    if rendered.is_empty() {
        None
    } else {
        Some(rendered.join("; "))
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.server.bind.trim().is_empty() {
            issues.push(ValidationIssue::error(
                "server.bind.empty",
                "bind address must not be empty".to_string(),
            ));
        }

        if self.execution.max_parallel_hosts == 0 {
            issues.push(ValidationIssue::error(
                "execution.max_parallel_hosts.zero",
                "max_parallel_hosts must be greater than zero".to_string(),
            ));
        }

        if self.execution.script_timeout_secs == 0 {
            issues.push(ValidationIssue::error(
                "execution.script_timeout.zero",
                "script timeout cannot be 0".to_string(),
            ));
        }

        for (code, template) in [
            ("transport.linux_command.placeholder", &self.transport.linux_command),
            ("transport.windows_command.placeholder", &self.transport.windows_command),
        ] {
            if !template.contains("{command}") {
                issues.push(ValidationIssue::error(
                    code,
                    format!("command template '{template}' has no {{command}} placeholder"),
                ));
            }
        }

        if self.transport.connect_timeout_secs == 0 {
            issues.push(ValidationIssue::warning(
                "transport.connect_timeout.zero",
                "connect timeout of 0s makes every network check fail".to_string(),
            ));
        }

        if !self.client.base_url.starts_with("http://")
            && !self.client.base_url.starts_with("https://")
        {
            issues.push(ValidationIssue::warning(
                "client.base_url.invalid",
                "client base URL should start with http:// or https://".to_string(),
            ));
        }

        issues
    }
}

impl Validate for TaskGraph {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.tasks.is_empty() {
            issues.push(ValidationIssue::error(
                "graph.tasks.empty",
                format!("project {} has no tasks", self.project_id),
            ));
        }

        let mut host_names = HashSet::new();
        for host in &self.hosts {
            if !host_names.insert(host.name.as_str()) {
                issues.push(ValidationIssue::error(
                    "host.name.duplicate",
                    format!("host name {} is used by more than one host", host.name),
                ));
            }
        }

        let host_ids = self.hosts.iter().map(|host| &host.id).collect::<HashSet<_>>();
        let script_ids = self
            .scripts
            .iter()
            .map(|script| &script.id)
            .collect::<HashSet<_>>();

        for task in &self.tasks {
            if task.system_id.0.trim().is_empty() {
                issues.push(ValidationIssue::error(
                    "task.system_id.empty",
                    format!("task on host {} has no system", task.host_id),
                ));
            }

            if task.script_ids.is_empty() {
                issues.push(ValidationIssue::error(
                    "task.scripts.empty",
                    format!(
                        "system {} on host {} has no scripts selected",
                        task.system_id, task.host_id
                    ),
                ));
            }

            if !host_ids.contains(&task.host_id) {
                issues.push(ValidationIssue::error(
                    "task.host.unknown",
                    format!("task references unknown host {}", task.host_id),
                ));
            }

            for script_id in &task.script_ids {
                if !script_ids.contains(script_id) {
                    issues.push(ValidationIssue::error(
                        "task.script.unknown",
                        format!("task on host {} references unknown script {script_id}", task.host_id),
                    ));
                }
            }

            for script_id in task.reference_data.keys() {
                if !task.script_ids.contains(script_id) {
                    issues.push(ValidationIssue::warning(
                        "task.reference_data.unused",
                        format!(
                            "reference data for script {script_id} on host {} is not used",
                            task.host_id
                        ),
                    ));
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Host, HostId, OsFamily, ProjectId, Script, ScriptId, SystemId, Task};
    use std::collections::{BTreeMap, BTreeSet};

    fn valid_graph() -> TaskGraph {
        TaskGraph {
            project_id: ProjectId::new("P1"),
            name: "audit".to_string(),
            hosts: vec![Host {
                id: HostId::new("h1"),
                name: "web01".to_string(),
                address: "10.0.0.5".to_string(),
                port: 22,
                os: OsFamily::Linux,
                username: Some("audit".to_string()),
            }],
            scripts: vec![Script {
                id: ScriptId::new("s1"),
                name: "uptime".to_string(),
                command: "uptime".to_string(),
            }],
            tasks: vec![Task {
                host_id: HostId::new("h1"),
                system_id: SystemId::new("base"),
                script_ids: BTreeSet::from([ScriptId::new("s1")]),
                reference_data: BTreeMap::new(),
            }],
        }
    }

    #[test]
    fn valid_graph_has_no_issues() {
        assert!(valid_graph().validate().is_empty());
    }

    #[test]
    fn graph_without_tasks_is_an_error() {
        let mut graph = valid_graph();
        graph.tasks.clear();

        let issues = graph.validate();
        assert!(render_errors(&issues).is_some());
        assert!(issues.iter().any(|issue| issue.code == "graph.tasks.empty"));
    }

    #[test]
    fn task_without_scripts_or_system_is_rejected() {
        let mut graph = valid_graph();
        graph.tasks[0].script_ids.clear();
        graph.tasks[0].system_id = SystemId::new(" ");

        let issues = graph.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|issue| issue.code == "task.scripts.empty"));
        assert!(issues.iter().any(|issue| issue.code == "task.system_id.empty"));
    }

    #[test]
    fn unknown_references_are_errors_and_unused_reference_data_warns() {
        let mut graph = valid_graph();
        graph.tasks[0].host_id = HostId::new("ghost");
        graph.tasks[0].script_ids.insert(ScriptId::new("missing"));
        graph.tasks[0]
            .reference_data
            .insert(ScriptId::new("other"), "x".to_string());

        let issues = graph.validate();
        assert!(issues.iter().any(|issue| issue.code == "task.host.unknown"));
        assert!(issues.iter().any(|issue| issue.code == "task.script.unknown"));
        assert!(issues.iter().any(|issue| {
            issue.code == "task.reference_data.unused" && issue.level == ValidationLevel::Warning
        }));
    }

    #[test]
    fn default_app_config_is_valid() {
        assert!(AppConfig::default().validate().is_empty());
    }

    #[test]
    fn app_config_reports_zero_limits_and_missing_placeholder() {
        let mut config = AppConfig::default();
        config.execution.max_parallel_hosts = 0;
        config.transport.linux_command = "ssh {address}".to_string();

        let issues = config.validate();
        assert_eq!(issues.len(), 2);
        let rendered = render_errors(&issues).expect("errors rendered");
        assert!(rendered.contains("execution.max_parallel_hosts.zero"));
        assert!(rendered.contains("transport.linux_command.placeholder"));
    }

    #[test]
    fn render_errors_ignores_warnings() {
        let mut config = AppConfig::default();
        config.client.base_url = "localhost".to_string();

        let issues = config.validate();
        assert_eq!(issues.len(), 1);
                assert_eq!(render_errors(&issues), None);
    }
    #[test]
    fn hosts_sharing_a_display_name_are_rejected() {
        let mut graph = valid_graph();
        let mut twin = graph.hosts[0].clone();
        twin.id = HostId::new("h1-twin");
        graph.hosts.push(twin);

        let issues = graph.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "host.name.duplicate");
        assert_eq!(issues[0].level, ValidationLevel::Error);
    }
}
