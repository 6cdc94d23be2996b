use std::{
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tokio::{
    process::{Child, Command},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::ExecutionError,
    limits::{RlimitConfig, attach_rlimits},
    util::{default_interpreter, kill_graceful},
};

mod capture;
pub use capture::Captured;

const TARGET: &str = "fleet.exec.proc";

/// How fetched scripts are started.
#[derive(Clone, Debug)]
pub struct ProcConfig {
    pub interpreter: String,
    /// Arguments placed before the script path.
    pub interpreter_args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
    /// Cap per stream (stdout and stderr each).
    pub max_output_bytes: usize,
    /// Time between SIGTERM and SIGKILL on timeout or cancellation.
    pub kill_grace: Duration,
    pub rlimits: RlimitConfig,
}

impl Default for ProcConfig {
    fn default() -> Self {
        let (interpreter, interpreter_args) = default_interpreter();
        Self {
            interpreter,
            interpreter_args,
            env: Vec::new(),
            cwd: None,
            timeout: None,
            max_output_bytes: 1024 * 1024,
            kill_grace: Duration::from_secs(2),
            rlimits: RlimitConfig::default(),
        }
    }
}

/// Raw outcome of a script that ran to completion.
#[derive(Debug, Clone)]
pub struct ProcOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
}

impl ProcOutput {
    /// Stdout on success; any stderr output or unclean exit is a failure.
    pub fn classify(self) -> Result<String, ExecutionError> {
        let stderr = self.stderr.text();
        if !self.status.success() {
            return Err(match self.status.code() {
                Some(code) => ExecutionError::NonZeroExit { code, stderr },
                None => ExecutionError::KilledBySignal { stderr },
            });
        }
        if !self.stderr.is_empty() {
            return Err(ExecutionError::Stderr(stderr));
        }
        Ok(self.stdout.text())
    }
}

pub struct ScriptRunner {
    cfg: ProcConfig,
}

impl ScriptRunner {
    pub fn new(cfg: ProcConfig) -> Self {
        Self { cfg }
    }

    /// Run `script` and classify the result.
    pub async fn run(
        &self,
        script: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, ExecutionError> {
        let out = self.execute(script, cancel).await?;
        if out.stdout.truncated || out.stderr.truncated {
            warn!(
                target: TARGET,
                script = %script.display(),
                limit = self.cfg.max_output_bytes,
                "script output truncated"
            );
        }
        out.classify()
    }

    /// Run `script` to completion, capturing both streams concurrently.
    pub async fn execute(
        &self,
        script: &Path,
        cancel: &CancellationToken,
    ) -> Result<ProcOutput, ExecutionError> {
        let mut cmd = Command::new(&self.cfg.interpreter);
        cmd.args(&self.cfg.interpreter_args)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(cwd) = &self.cfg.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &self.cfg.env {
            cmd.env(k, v);
        }
        attach_rlimits(&mut cmd, &self.cfg.rlimits);

        trace!(target: TARGET, interpreter = %self.cfg.interpreter, script = %script.display(), "spawn");
        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutionError::Spawn(format!("{}: {e}", self.cfg.interpreter)))?;

        let group = child.id();
        let limit = self.cfg.max_output_bytes;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::Io("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::Io("stderr not captured".into()))?;
        let mut out_task = tokio::spawn(capture::capture(stdout, limit));
        let mut err_task = tokio::spawn(capture::capture(stderr, limit));

        let timeout = self.cfg.timeout;
        let deadline = async move {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };

        // The streams stay open while anything the script spawned holds them, so reading them
        // to the end is bounded by the same deadline as the script itself.
        let outcome = tokio::select! {
            res = wait_and_collect(&mut child, &mut out_task, &mut err_task) => res,
            _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
            _ = deadline => Err(ExecutionError::Timeout(timeout.unwrap_or_default())),
        };
        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                debug!(target: TARGET, script = %script.display(), reason = %e, "killing script");
                if let Err(kill_err) = kill_graceful(&mut child, group, self.cfg.kill_grace).await {
                    warn!(target: TARGET, error = %kill_err, "failed to kill script");
                }
                out_task.abort();
                err_task.abort();
                return Err(e);
            }
        };

        debug!(
            target: TARGET,
            script = %script.display(),
            status = %output.status,
            stdout_bytes = output.stdout.bytes.len(),
            stderr_bytes = output.stderr.bytes.len(),
            "script exited"
        );
        Ok(output)
    }
}

async fn wait_and_collect(
    child: &mut Child,
    out_task: &mut JoinHandle<std::io::Result<Captured>>,
    err_task: &mut JoinHandle<std::io::Result<Captured>>,
) -> Result<ProcOutput, ExecutionError> {
    let status = child.wait().await?;
    let stdout = join_capture(out_task).await?;
    let stderr = join_capture(err_task).await?;
    Ok(ProcOutput {
        status,
        stdout,
        stderr,
    })
}

async fn join_capture(
    task: &mut JoinHandle<std::io::Result<Captured>>,
) -> Result<Captured, ExecutionError> {
    task.await
        .map_err(|e| ExecutionError::Io(format!("output reader: {e}")))?
        .map_err(ExecutionError::from)
}
