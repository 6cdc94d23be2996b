use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error("artifact {path} cannot be served: {reason}")]
    Artifact { path: String, reason: String },
    #[error("executor setup failed on node {node}: {reason}")]
    Executor { node: String, reason: String },
    #[error("invalid cluster configuration: {0}")]
    Config(String),
}
