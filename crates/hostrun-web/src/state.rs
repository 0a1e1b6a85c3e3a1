use std::collections::BTreeMap;
use std::sync::Arc;

use hostrun_core::config::ProjectCatalog;
use hostrun_core::types::{ProjectId, TaskGraph};
use hostrun_exec::Coordinator;
use hostrun_notify::{NotificationDispatcher, NotificationPolicy, NotificationSinkKind};
use tokio::sync::RwLock;

use crate::error::WebError;

pub const DEFAULT_STREAM_BUFFER: usize = 256;

#[derive(Debug, Default)]
struct WebStateInner {
    catalog: ProjectCatalog,
    execution_failures: BTreeMap<ProjectId, u64>,
}

#[derive(Clone)]
pub struct WebState {
    inner: Arc<RwLock<WebStateInner>>,
    coordinator: Coordinator,
    token: Arc<str>,
    notifier: Arc<NotificationDispatcher>,
    stream_buffer: usize,
}

impl WebState {
    pub fn new(catalog: ProjectCatalog, coordinator: Coordinator, token: impl Into<Arc<str>>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(WebStateInner {
                catalog,
                execution_failures: BTreeMap::new(),
            })),
            coordinator,
            token: token.into(),
            notifier: Arc::new(NotificationDispatcher::from_policy(&NotificationPolicy {
                enabled_sinks: vec![NotificationSinkKind::Tracing],
            })),
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    pub fn authorize(&self, token: Option<&str>) -> Result<(), WebError> {
        match token {
            Some(token) if !token.is_empty() && token == &*self.token => Ok(()),
            _ => Err(WebError::Unauthorized),
        }
    }

    pub async fn project(&self, project_id: &ProjectId) -> Option<TaskGraph> {
        let guard = self.inner.read().await;
        guard.catalog.project(project_id).cloned()
    }

    /// Returns the new failure count for the project.
    pub async fn record_execution_failed(&self, project_id: &ProjectId) -> u64 {
        let mut guard = self.inner.write().await;
        let count = guard
            .execution_failures
            .entry(project_id.clone())
            .or_insert(0);
        *count += 1;
        *count
    }

    pub async fn execution_failures(&self, project_id: &ProjectId) -> u64 {
        let guard = self.inner.read().await;
        guard
            .execution_failures
            .get(project_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn notifier(&self) -> Arc<NotificationDispatcher> {
        self.notifier.clone()
    }

    pub fn stream_buffer(&self) -> usize {
        self.stream_buffer
    }
}
