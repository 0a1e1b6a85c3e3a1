#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification sink {sink} failed: {message}")]
    SinkFailed { sink: String, message: String },
    #[error("failed to write notification to {sink}: {source}")]
    Write {
        sink: String,
        #[source]
        source: std::io::Error,
    },
}
