use std::sync::Arc;

use async_trait::async_trait;
use hostrun_core::types::{Execution, ExecutionSession, ProjectId, SessionId};
use tokio::sync::RwLock;

use crate::error::ExecError;

/// Persistence collaborator for sessions and execution records.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn open_session(&self, project_id: &ProjectId) -> Result<ExecutionSession, ExecError>;
    async fn record(&self, execution: Execution) -> Result<(), ExecError>;
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    sessions: Vec<ExecutionSession>,
    executions: Vec<Execution>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryExecutionStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

impl MemoryExecutionStore {
    pub async fn sessions(&self) -> Vec<ExecutionSession> {
        let guard = self.inner.read().await;
        guard.sessions.clone()
    }

    pub async fn executions(&self, session_id: &SessionId) -> Vec<Execution> {
        let guard = self.inner.read().await;
        guard
            .executions
            .iter()
            .filter(|execution| &execution.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn open_session(&self, project_id: &ProjectId) -> Result<ExecutionSession, ExecError> {
        let session = ExecutionSession::start(project_id.clone());
        let mut guard = self.inner.write().await;
        guard.sessions.push(session.clone());
        Ok(session)
    }

    async fn record(&self, execution: Execution) -> Result<(), ExecError> {
        let mut guard = self.inner.write().await;
        let duplicate = guard.executions.iter().any(|existing| {
            existing.session_id == execution.session_id
                && existing.host_id == execution.host_id
                && existing.script_id == execution.script_id
        });
        if duplicate {
            return Err(ExecError::Store {
                message: format!(
                    "execution for host {} script {} already recorded in session {}",
                    execution.host_id, execution.script_id, execution.session_id
                ),
            });
        }
        guard.executions.push(execution);
        Ok(())
    }
}
