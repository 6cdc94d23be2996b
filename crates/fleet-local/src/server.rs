//! Static artifact hosting for executors and task scripts.

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::{Path as FsPath, PathBuf},
    sync::Arc,
};

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::ClusterError;

const TARGET: &str = "fleet.local.artifacts";

#[derive(Debug, Default)]
struct Artifacts {
    /// Registered single files, by URL name.
    files: HashMap<String, PathBuf>,
    /// Optional tree served under its relative paths.
    root: Option<PathBuf>,
}

impl Artifacts {
    fn resolve(&self, rel: &str) -> Option<PathBuf> {
        if let Some(path) = self.files.get(rel) {
            return Some(path.clone());
        }
        let root = self.root.as_ref()?;
        let safe = rel
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != ".." && !seg.contains('\\'));
        safe.then(|| root.join(rel))
    }
}

/// Serves registered files at `/<file name>` and, optionally, a directory tree.
///
/// Bind first so the advertised URIs carry the real port.
pub struct ArtifactServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    artifacts: Artifacts,
}

impl ArtifactServer {
    pub async fn bind(addr: SocketAddr) -> Result<Self, ClusterError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| ClusterError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        let local_addr = listener.local_addr().map_err(|e| ClusterError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            listener,
            local_addr,
            artifacts: Artifacts::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register `path` under its file name and return the URI executors fetch it from.
    pub fn serve_file(&mut self, path: impl AsRef<FsPath>) -> Result<String, ClusterError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ClusterError::Artifact {
                path: path.display().to_string(),
                reason: "no usable file name".to_string(),
            })?;
        if !path.is_file() {
            return Err(ClusterError::Artifact {
                path: path.display().to_string(),
                reason: "not a regular file".to_string(),
            });
        }
        let uri = self.uri_for(name);
        info!(target: TARGET, path = %path.display(), %uri, "hosting artifact");
        self.artifacts
            .files
            .insert(name.to_string(), path.to_path_buf());
        Ok(uri)
    }

    /// Serve everything below `dir` at its relative path.
    pub fn serve_dir(&mut self, dir: impl Into<PathBuf>) -> Result<(), ClusterError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(ClusterError::Artifact {
                path: dir.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }
        info!(target: TARGET, dir = %dir.display(), "hosting artifact directory");
        self.artifacts.root = Some(dir);
        Ok(())
    }

    pub fn uri_for(&self, name: &str) -> String {
        format!("http://{}/{}", self.local_addr, name.trim_start_matches('/'))
    }

    pub fn spawn(self) -> ServerHandle {
        let shutdown = CancellationToken::new();
        let router = Router::new()
            .route("/{*path}", get(serve_artifact))
            .with_state(Arc::new(self.artifacts));

        let stop = shutdown.clone();
        let addr = self.local_addr;
        let task = tokio::spawn(async move {
            let res = axum::serve(self.listener, router)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await;
            if let Err(e) = res {
                error!(target: TARGET, %addr, error = %e, "artifact server failed");
            }
        });
        info!(target: TARGET, %addr, "artifact server listening");
        ServerHandle {
            local_addr: addr,
            shutdown,
            task,
        }
    }
}

pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}

async fn serve_artifact(
    State(artifacts): State<Arc<Artifacts>>,
    Path(rel): Path<String>,
) -> Response {
    let Some(path) = artifacts.resolve(&rel) else {
        debug!(target: TARGET, %rel, "unknown artifact");
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!(target: TARGET, %rel, bytes = bytes.len(), "artifact served");
            (StatusCode::OK, bytes).into_response()
        }
        Err(e) => {
            debug!(target: TARGET, %rel, path = %path.display(), error = %e, "artifact unreadable");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
