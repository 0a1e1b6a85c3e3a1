use std::io::Write;

use tracing::{error, info, warn};

use crate::error::NotifyError;
use crate::types::{
    NotificationMessage, NotificationPolicy, NotificationSeverity, NotificationSinkKind,
};

pub trait NotificationSink: Send + Sync {
    fn kind(&self) -> NotificationSinkKind;
    fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Default)]
pub struct StdoutSink;

impl NotificationSink for StdoutSink {
    fn kind(&self) -> NotificationSinkKind {
        NotificationSinkKind::Stdout
    }

    fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", format_line(message)).map_err(|source| NotifyError::Write {
            sink: "stdout".to_string(),
            source,
        })
    }
}

/// Emits notifications as log records at a level matching their severity.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn kind(&self) -> NotificationSinkKind {
        NotificationSinkKind::Tracing
    }

    fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError> {
        let project_id = message
            .project_id
            .as_ref()
            .map(|id| id.0.as_str())
            .unwrap_or("-");
        match message.severity {
            NotificationSeverity::Info => {
                info!(project_id, topic = ?message.topic, body = %message.body, "{}", message.title)
            }
            NotificationSeverity::Warning => {
                warn!(project_id, topic = ?message.topic, body = %message.body, "{}", message.title)
            }
            NotificationSeverity::Error => {
                error!(project_id, topic = ?message.topic, body = %message.body, "{}", message.title)
            }
        }
        Ok(())
    }
}

pub fn format_line(message: &NotificationMessage) -> String {
    format!(
        "[{:?}] {:?} {} | project={} | {}",
        message.severity,
        message.topic,
        message.title,
        message
            .project_id
            .as_ref()
            .map(|id| id.0.as_str())
            .unwrap_or("-"),
        message.body
    )
}

pub struct NotificationDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl NotificationDispatcher {
    pub fn new(sinks: Vec<Box<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn from_policy(policy: &NotificationPolicy) -> Self {
        let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();
        for sink in &policy.enabled_sinks {
            match sink {
                NotificationSinkKind::Stdout => sinks.push(Box::new(StdoutSink)),
                NotificationSinkKind::Tracing => sinks.push(Box::new(TracingSink)),
            }
        }
        Self { sinks }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Sends `message` to every sink. A failing sink is logged and does not
    /// stop delivery to the others.
    pub fn dispatch(
        &self,
        message: &NotificationMessage,
    ) -> Vec<(NotificationSinkKind, Result<(), NotifyError>)> {
        let mut out = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let result = sink.send(message);
            if let Err(err) = &result {
                warn!(sink = ?sink.kind(), error = %err, "notification delivery failed");
            }
            out.push((sink.kind(), result));
        }
        out
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field(
                "sinks",
                &self.sinks.iter().map(|sink| sink.kind()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
