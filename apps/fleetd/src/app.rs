use std::net::SocketAddr;

use anyhow::Context;
use tracing::{info, warn};

use fleet_core::{
    CoreError, RetryPolicy, RunSummary, Scheduler, SchedulerConfig, SchedulerDriver,
    load_work_queue,
};
use fleet_local::{ArtifactServer, ClusterConfig, LocalCluster};
use fleet_model::{CPUS, ExecutorInfo, Filters, MEM, ResourceDemand, Resources};

use crate::cli::Cli;

const TARGET: &str = "fleetd";

/// Exit code for failures outside the framework's error classes.
const GENERIC_FAILURE: u8 = 1;

/// Map a bootstrap or run failure to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CoreError>()
        .map(CoreError::exit_code)
        .unwrap_or(GENERIC_FAILURE)
}

pub fn scheduler_config(cli: &Cli) -> Result<SchedulerConfig, CoreError> {
    let demand = ResourceDemand::new(cli.cpu_per_task, cli.mem_per_task)?;
    let mut cfg = SchedulerConfig::new(demand);
    cfg.filters = Filters::refuse(cli.refuse_seconds);
    cfg.retry = RetryPolicy::retries(cli.max_retries);
    Ok(cfg)
}

pub fn cluster_config(cli: &Cli, artifact_addr: SocketAddr) -> ClusterConfig {
    let node = Resources::new()
        .with(CPUS, cli.node_cpus)
        .with(MEM, cli.node_mem);
    let mut cfg = ClusterConfig::uniform(cli.nodes, node);
    cfg.offer_timeout = cli.offer_timeout();
    cfg.pipeline.fetch.address = artifact_addr.to_string();
    cfg.pipeline.fetch.scratch_dir = cli.scratch_dir();
    cfg.pipeline.proc.timeout = cli.task_timeout();
    cfg.pipeline.proc.max_output_bytes = cli.max_output_bytes;
    cfg
}

/// Bring up the artifact server and the cluster, then run the work queue to completion.
pub async fn run(cli: Cli) -> anyhow::Result<RunSummary> {
    if !cli.is_local() {
        return Err(CoreError::Transport(format!(
            "cannot create driver for master {}: only the in-process `local` cluster is available",
            cli.master_address
        ))
        .into());
    }

    let commands = load_work_queue(&cli.work_source_path)
        .await
        .context("loading work queue")?;
    let mut sched_cfg = scheduler_config(&cli)?;

    let bind = SocketAddr::new(cli.address, cli.artifact_port);
    let mut server = ArtifactServer::bind(bind)
        .await
        .map_err(|e| CoreError::Transport(e.to_string()))
        .context("starting artifact server")?;
    server
        .serve_dir(cli.artifact_dir())
        .map_err(|e| CoreError::Config(e.to_string()))?;
    if let Some(path) = &cli.executor_path {
        sched_cfg.executor = advertised_executor(&mut server, path)?;
    }
    let server = server.spawn();

    let (cluster, mut events) = LocalCluster::start(cluster_config(&cli, server.local_addr()))
        .map_err(|e| CoreError::Transport(e.to_string()))
        .context("starting local cluster")?;
    info!(
        target: TARGET,
        framework_id = %cluster.framework_id(),
        tasks = commands.len(),
        artifacts = %server.local_addr(),
        "framework starting"
    );

    let outcome = match Scheduler::new(sched_cfg, commands) {
        Ok(mut scheduler) => {
            tokio::select! {
                res = scheduler.run(&mut events, &cluster) => res,
                _ = tokio::signal::ctrl_c() => {
                    warn!(target: TARGET, "interrupted, aborting framework");
                    if let Err(e) = cluster.abort().await {
                        warn!(target: TARGET, error = %e, "abort failed");
                    }
                    Err(CoreError::Disconnected)
                }
            }
        }
        Err(e) => Err(e),
    };

    // Executors forward into the event channel; it must be gone before they are joined.
    drop(events);
    for (node_id, stats) in cluster.shutdown().await {
        info!(target: TARGET, %node_id, ?stats, "executor stopped");
    }
    server.shutdown().await;

    Ok(outcome?)
}

fn advertised_executor(
    server: &mut ArtifactServer,
    path: &std::path::Path,
) -> Result<ExecutorInfo, CoreError> {
    let uri = server
        .serve_file(path)
        .map_err(|e| CoreError::Config(e.to_string()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ExecutorInfo {
        command: format!("./{name}"),
        uri: Some(uri),
        ..ExecutorInfo::default()
    })
}
