//! Wire protocol of the execution stream: one JSON object per line.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error_codes::ErrorInfo;
use crate::state::RunStatus;

/// Fixed label the `info` message carries the task count under.
pub const TOTAL_TASKS_LABEL: &str = "Всего заданий:";

static TOTAL_TASKS_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"Всего заданий:\s*(\d+)").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Network,
    Login,
    Sudo,
}

impl CheckKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Network => "network",
            CheckKind::Login => "login",
            CheckKind::Sudo => "sudo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub host_name: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ErrorInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Info {
        message: String,
    },
    TaskStart {
        host_name: String,
    },
    CheckNetwork(CheckReport),
    CheckLogin(CheckReport),
    CheckSudo(CheckReport),
    ScriptProgress {
        host_name: String,
        completed: u64,
        total: u64,
    },
    TaskComplete {
        host_name: String,
        success: bool,
    },
    TaskError {
        host_name: String,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_info: Option<ErrorInfo>,
    },
    Complete {
        total: u64,
        completed: u64,
        failed: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        successful_hosts: Option<u64>,
        status: RunStatus,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn info_for_total(project_name: &str, total: usize) -> Self {
        StreamEvent::Info {
            message: format!("Запуск проекта «{project_name}». {TOTAL_TASKS_LABEL} {total}"),
        }
    }

    pub fn check(kind: CheckKind, report: CheckReport) -> Self {
        match kind {
            CheckKind::Network => StreamEvent::CheckNetwork(report),
            CheckKind::Login => StreamEvent::CheckLogin(report),
            CheckKind::Sudo => StreamEvent::CheckSudo(report),
        }
    }

    pub fn host_name(&self) -> Option<&str> {
        match self {
            StreamEvent::TaskStart { host_name }
            | StreamEvent::ScriptProgress { host_name, .. }
            | StreamEvent::TaskComplete { host_name, .. }
            | StreamEvent::TaskError { host_name, .. } => Some(host_name),
            StreamEvent::CheckNetwork(report)
            | StreamEvent::CheckLogin(report)
            | StreamEvent::CheckSudo(report) => Some(&report.host_name),
            StreamEvent::Info { .. } | StreamEvent::Complete { .. } | StreamEvent::Error { .. } => {
                None
            }
        }
    }

    pub fn as_check(&self) -> Option<(CheckKind, &CheckReport)> {
        match self {
            StreamEvent::CheckNetwork(report) => Some((CheckKind::Network, report)),
            StreamEvent::CheckLogin(report) => Some((CheckKind::Login, report)),
            StreamEvent::CheckSudo(report) => Some((CheckKind::Sudo, report)),
            _ => None,
        }
    }

    pub fn is_failed_check_for(&self, host: &str) -> bool {
        self.as_check()
            .is_some_and(|(_, report)| !report.success && report.host_name == host)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}

pub fn event_name(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::Info { .. } => "info",
        StreamEvent::TaskStart { .. } => "task_start",
        StreamEvent::CheckNetwork(_) => "check_network",
        StreamEvent::CheckLogin(_) => "check_login",
        StreamEvent::CheckSudo(_) => "check_sudo",
        StreamEvent::ScriptProgress { .. } => "script_progress",
        StreamEvent::TaskComplete { .. } => "task_complete",
        StreamEvent::TaskError { .. } => "task_error",
        StreamEvent::Complete { .. } => "complete",
        StreamEvent::Error { .. } => "error",
    }
}

/// Reads the task count out of an `info` message.
pub fn parse_total_tasks(message: &str) -> Option<u64> {
    let pattern = TOTAL_TASKS_PATTERN.as_ref()?;
    pattern.captures(message)?.get(1)?.as_str().parse().ok()
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("frame is not a known event: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

/// Encodes one event as a newline-terminated frame.
pub fn encode_frame(event: &StreamEvent) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_frame(line: &str) -> Result<StreamEvent, FrameError> {
    Ok(serde_json::from_str(line.trim())?)
}
