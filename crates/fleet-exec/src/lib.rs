//! Node side of the fleet framework.
//!
//! An [`Executor`] receives task assignments from the transport and runs them one at a time
//! through a [`TaskRunner`]; the default workload is the artifact [`Pipeline`]
//! (download a script over HTTP, run it, classify the result).

mod error;
pub use error::{ExecutionError, FetchError, PipelineError};

mod util;
pub use util::{default_interpreter, kill_graceful};

pub mod limits;
pub use limits::{RlimitConfig, attach_rlimits};

pub mod fetch;
pub use fetch::{ArtifactFetcher, FetchConfig};

pub mod proc;
pub use proc::{Captured, ProcConfig, ProcOutput, ScriptRunner};

pub mod pipeline;
pub use pipeline::{Pipeline, PipelineConfig};

pub mod driver;
pub use driver::{ExecutorDriver, StatusSendError};

pub mod executor;
pub use executor::{Executor, ExecutorEvent, ExecutorStats, TaskRunner, Workload};

#[cfg(test)]
pub(crate) mod testutil;
