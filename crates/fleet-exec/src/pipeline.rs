use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::{
    error::{FetchError, PipelineError},
    fetch::{ArtifactFetcher, FetchConfig},
    proc::{ProcConfig, ScriptRunner},
};

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub proc: ProcConfig,
}

/// Fetch a script artifact, then run it. The two steps never overlap.
pub struct Pipeline {
    fetcher: ArtifactFetcher,
    runner: ScriptRunner,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: ArtifactFetcher::new(cfg.fetch)?,
            runner: ScriptRunner::new(cfg.proc),
        })
    }

    #[instrument(level = "debug", target = "fleet.exec.pipeline", skip(self, cancel))]
    pub async fn fetch_and_run(
        &self,
        locator: &str,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let script = self.fetcher.fetch(locator, cancel).await?;
        info!(target: "fleet.exec.pipeline", script = %script.display(), "artifact ready, running");
        Ok(self.runner.run(&script, cancel).await?)
    }

    /// Download the executor binary advertised at `uri` and mark it executable.
    #[instrument(level = "debug", target = "fleet.exec.pipeline", skip(self, cancel))]
    pub async fn stage(&self, uri: &str, cancel: &CancellationToken) -> Result<PathBuf, FetchError> {
        let path = self.fetcher.fetch(uri, cancel).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| FetchError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
        }
        info!(target: "fleet.exec.pipeline", path = %path.display(), "executor staged");
        Ok(path)
    }
}
