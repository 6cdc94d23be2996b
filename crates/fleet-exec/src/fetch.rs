use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::{fs, io::AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::FetchError;

const TARGET: &str = "fleet.exec.fetch";

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// `host:port` of the artifact server, used for relative locators.
    pub address: String,
    /// Downloads land in `<scratch_dir>/<final locator segment>`.
    pub scratch_dir: PathBuf,
    pub timeout: Duration,
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8000".to_string(),
            scratch_dir: std::env::temp_dir(),
            timeout: Duration::from_secs(60),
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Downloads task artifacts into the node's scratch directory.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    cfg: FetchConfig,
    client: reqwest::Client,
}

impl ArtifactFetcher {
    pub fn new(cfg: FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .no_proxy()
            .build()
            .map_err(|e| FetchError::Request {
                url: cfg.address.clone(),
                reason: format!("building http client: {e}"),
            })?;
        Ok(Self { cfg, client })
    }

    /// Absolute `http(s)://` locators are used as-is, anything else is served by the artifact host.
    pub fn resolve_url(&self, locator: &str) -> String {
        if is_absolute(locator) {
            return locator.to_string();
        }
        format!(
            "http://{}/{}",
            self.cfg.address.trim_end_matches('/'),
            locator.trim_start_matches('/')
        )
    }

    pub fn destination(&self, locator: &str) -> Result<PathBuf, FetchError> {
        Ok(self.cfg.scratch_dir.join(file_name(locator)?))
    }

    /// Download `locator` and return the local path of the artifact.
    pub async fn fetch(
        &self,
        locator: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        let dest = self.destination(locator)?;
        let url = self.resolve_url(locator);
        debug!(target: TARGET, %url, dest = %dest.display(), "downloading artifact");

        let res = tokio::select! {
            res = self.download(&url, &dest) => res,
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
        };
        match res {
            Ok(bytes) => {
                debug!(target: TARGET, %url, bytes, "artifact downloaded");
                Ok(dest)
            }
            Err(e) => {
                // Never leave a half-written script behind.
                let _ = fs::remove_file(&dest).await;
                Err(e)
            }
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let limit = self.cfg.max_bytes;
        if resp.content_length().is_some_and(|len| len > limit) {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit,
            });
        }

        fs::create_dir_all(&self.cfg.scratch_dir)
            .await
            .map_err(|e| io_error(&self.cfg.scratch_dir, e))?;
        let mut file = fs::File::create(dest)
            .await
            .map_err(|e| io_error(dest, e))?;

        let mut written: u64 = 0;
        while let Some(chunk) = resp.chunk().await.map_err(|e| request_error(url, e))? {
            written += chunk.len() as u64;
            if written > limit {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit,
                });
            }
            trace!(target: TARGET, %url, written, "chunk");
            file.write_all(&chunk).await.map_err(|e| io_error(dest, e))?;
        }
        file.flush().await.map_err(|e| io_error(dest, e))?;
        Ok(written)
    }
}

fn is_absolute(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

/// Final path segment of a locator, without query or fragment.
pub fn file_name(locator: &str) -> Result<&str, FetchError> {
    let path = locator.split(['?', '#']).next().unwrap_or_default();
    let path = if is_absolute(path) {
        // Skip the authority so that `http://host` has no file name.
        path.splitn(4, '/').nth(3).unwrap_or_default()
    } else {
        path
    };
    let name = path.rsplit('/').next().unwrap_or_default().trim();

    let reason = match name {
        "" => "no file name",
        "." | ".." => "file name is a relative path component",
        n if n.contains('\\') => "file name contains a path separator",
        n => return Ok(n),
    };
    Err(FetchError::InvalidLocator {
        locator: locator.to_string(),
        reason: reason.to_string(),
    })
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}
