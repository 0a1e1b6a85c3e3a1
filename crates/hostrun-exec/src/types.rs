use async_trait::async_trait;
use hostrun_core::events::CheckKind;
use hostrun_core::types::{Host, Script};

use crate::error::ExecError;

/// Result of one pre-check against a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub success: bool,
    pub message: String,
    /// Diagnostic text (stderr, exit status) used to explain a failure.
    pub detail: String,
}

impl CheckOutcome {
    pub fn passed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            detail: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Connection to remote hosts. Implementations decide how hosts are reached;
/// the coordinator only relies on this contract.
#[async_trait]
pub trait HostTransport: Send + Sync {
    async fn check(&self, kind: CheckKind, host: &Host) -> CheckOutcome;

    async fn run_script(
        &self,
        host: &Host,
        script: &Script,
        reference: Option<&str>,
    ) -> Result<ScriptOutput, ExecError>;
}
