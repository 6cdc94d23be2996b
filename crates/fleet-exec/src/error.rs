use std::time::Duration;

use thiserror::Error;

/// Failure to bring an artifact onto the node.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid locator {locator:?}: {reason}")]
    InvalidLocator { locator: String, reason: String },
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("fetching {url} timed out")]
    Timeout { url: String },
    #[error("artifact {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },
    #[error("io error on {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("cancelled")]
    Cancelled,
}

/// Failure of the fetched script itself.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("non-zero exit code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
    #[error("killed by signal: {stderr}")]
    KilledBySignal { stderr: String },
    /// Exit status was clean but the script wrote to stderr.
    #[error("stderr output: {0}")]
    Stderr(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(String),
    #[error("cancelled")]
    Cancelled,
}

impl From<std::io::Error> for ExecutionError {
    fn from(e: std::io::Error) -> Self {
        ExecutionError::Io(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            PipelineError::Fetch(FetchError::Cancelled)
                | PipelineError::Execution(ExecutionError::Cancelled)
        )
    }
}
