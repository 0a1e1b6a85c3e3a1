#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("project {project_id} cannot run: {message}")]
    InvalidGraph { project_id: String, message: String },
    #[error("no reachable hosts in project {project_id}")]
    NoReachableHosts { project_id: String },
    #[error("command failed to start on {host} ({command}): {source}")]
    Spawn {
        host: String,
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error talking to {host}: {source}")]
    Io {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("execution store failed: {message}")]
    Store { message: String },
}
