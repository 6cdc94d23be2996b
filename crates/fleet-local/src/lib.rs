//! In-process stand-in for the cluster resource manager.
//!
//! [`LocalCluster`] owns a set of simulated nodes, generates offers from their free resources,
//! and runs an [`fleet_exec::Executor`] per node. [`ArtifactServer`] hosts the scripts those
//! executors download.

mod error;
pub use error::ClusterError;

pub mod cluster;
pub use cluster::{ClusterConfig, LocalCluster, NodeSpec, WorkloadFactory};

pub mod server;
pub use server::{ArtifactServer, ServerHandle};
