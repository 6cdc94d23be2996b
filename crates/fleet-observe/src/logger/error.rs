use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format '{0}' (expected text, json or journald)")]
    UnknownFormat(String),
    #[error("journald output is unavailable in this build")]
    JournaldUnavailable,
    #[error("a global logger is already installed")]
    AlreadyInitialized,
    #[error("logger init failed: {0}")]
    Init(String),
    #[error("bad log filter '{0}'")]
    BadFilter(String),
}
