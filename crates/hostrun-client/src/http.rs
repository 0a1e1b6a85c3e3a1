//! Event source and failure reporter over chunked HTTP.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use hostrun_core::types::ProjectId;
use tracing::{debug, warn};
use url::Url;

use crate::decoder::{FrameDecoder, SourceItem};
use crate::error::ClientError;
use crate::source::{EventSource, FailureReporter, TokenProvider};

pub const EXECUTE_ACTION: &str = "execute";
pub const EXECUTION_FAILED_ACTION: &str = "execution-failed";

/// Builds `{base}/api/projects/{project_id}/{action}`.
pub fn project_url(base: &str, project_id: &ProjectId, action: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(base).map_err(|source| ClientError::InvalidUrl {
        url: base.to_string(),
        source,
    })?;
    url.path_segments_mut()
        .map_err(|()| ClientError::NotABaseUrl {
            url: base.to_string(),
        })?
        .pop_if_empty()
        .extend(["api", "projects", project_id.as_ref(), action]);
    Ok(url)
}

pub fn execute_url(base: &str, project_id: &ProjectId, token: &str) -> Result<Url, ClientError> {
    let mut url = project_url(base, project_id, EXECUTE_ACTION)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

pub struct HttpEventSource {
    client: reqwest::Client,
    base_url: String,
    project_id: ProjectId,
    tokens: Arc<dyn TokenProvider>,
    decoder: FrameDecoder,
    body: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    pending: VecDeque<SourceItem>,
}

impl HttpEventSource {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        project_id: ProjectId,
        tokens: Arc<dyn TokenProvider>,
        max_frame_bytes: usize,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            project_id,
            tokens,
            decoder: FrameDecoder::new(max_frame_bytes),
            body: None,
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn open(&mut self) -> Result<(), ClientError> {
        let token = self.tokens.token()?;
        let url = execute_url(&self.base_url, &self.project_id, &token)?;
        debug!(project_id = %self.project_id, "opening execution stream");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ClientError::Http { source })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        self.body = Some(response.bytes_stream().boxed());
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<SourceItem>, ClientError> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Ok(Some(item));
            }
            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };
            match body.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.decoder.push(&chunk)),
                Some(Err(source)) => {
                    self.body = None;
                    return Err(ClientError::Http { source });
                }
                None => {
                    self.body = None;
                    self.pending.extend(self.decoder.finish());
                }
            }
        }
    }

    async fn close(&mut self) {
        self.body = None;
        self.pending.clear();
    }
}

/// Reports `execution-failed` with a plain GET. Failures are logged and
/// returned for the caller to drop.
#[derive(Debug, Clone)]
pub struct HttpFailureReporter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFailureReporter {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl FailureReporter for HttpFailureReporter {
    async fn report_execution_failed(&self, project_id: &ProjectId) -> Result<(), ClientError> {
        let url = project_url(&self.base_url, project_id, EXECUTION_FAILED_ACTION)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ClientError::Http { source })?;
        let status = response.status();
        if !status.is_success() {
            warn!(project_id = %project_id, status = status.as_u16(), "execution-failed report rejected");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}
