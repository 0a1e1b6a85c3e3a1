use async_trait::async_trait;
use hostrun_core::types::ProjectId;

use crate::decoder::SourceItem;
use crate::error::ClientError;

/// A one-way push channel of stream frames.
///
/// `next_frame` yields `Ok(None)` once the channel closed cleanly and `Err`
/// on a transport failure. Frames that fail to decode arrive as
/// [`SourceItem::Malformed`] and do not end the stream.
#[async_trait]
pub trait EventSource: Send {
    async fn open(&mut self) -> Result<(), ClientError>;
    async fn next_frame(&mut self) -> Result<Option<SourceItem>, ClientError>;
    async fn close(&mut self);
}

/// Receives the execution-failed report for a run that produced no events.
#[async_trait]
pub trait FailureReporter: Send + Sync {
    async fn report_execution_failed(&self, project_id: &ProjectId) -> Result<(), ClientError>;
}

/// Supplies the bearer token at request time.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Result<String, ClientError>;
}

#[derive(Debug, Clone)]
pub struct EnvTokenProvider {
    pub var: String,
}

impl EnvTokenProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenProvider for EnvTokenProvider {
    fn token(&self) -> Result<String, ClientError> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(ClientError::MissingToken {
                env: self.var.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticTokenProvider(pub String);

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> Result<String, ClientError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_token_provider_reports_missing_variable() {
        let provider = EnvTokenProvider::new("HOSTRUN_TEST_TOKEN_THAT_IS_NEVER_SET");
        let err = provider.token().expect_err("variable is unset");
        assert!(matches!(err, ClientError::MissingToken { env } if env == "HOSTRUN_TEST_TOKEN_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn static_token_provider_returns_its_token() {
        let provider = StaticTokenProvider("secret".to_string());
        assert_eq!(provider.token().expect("token"), "secret");
    }
}
