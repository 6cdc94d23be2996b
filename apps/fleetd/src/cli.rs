use std::{net::IpAddr, path::PathBuf, time::Duration};

use clap::Parser;

use fleet_observe::{LoggerConfig, LoggerFormat};

/// Master address that selects the in-process cluster.
pub const LOCAL_MASTER: &str = "local";

#[derive(Debug, Parser)]
#[command(name = "fleetd", version)]
#[command(about = "Run every script of a work queue as one cluster task")]
pub struct Cli {
    /// Resource manager to register with. Only `local` is available.
    #[arg(long = "master", env = "FLEET_MASTER", default_value = LOCAL_MASTER)]
    pub master_address: String,

    /// Interface the artifact server binds to.
    #[arg(long, env = "FLEET_ADDRESS", default_value = "127.0.0.1")]
    pub address: IpAddr,

    /// Port of the artifact server; 0 picks a free one.
    #[arg(long, env = "FLEET_ARTIFACT_PORT", default_value_t = 8000)]
    pub artifact_port: u16,

    #[arg(long, env = "FLEET_CPU_PER_TASK", default_value_t = 1.0)]
    pub cpu_per_task: f64,

    #[arg(long, env = "FLEET_MEM_PER_TASK", default_value_t = 128.0)]
    pub mem_per_task: f64,

    /// Executor binary advertised to nodes.
    #[arg(long = "executor", env = "FLEET_EXECUTOR")]
    pub executor_path: Option<PathBuf>,

    /// Newline-delimited work queue, one artifact locator per line.
    #[arg(long = "commands", env = "FLEET_COMMANDS", default_value = "commands")]
    pub work_source_path: PathBuf,

    /// Directory served to executors. Defaults to the work queue's directory.
    #[arg(long, env = "FLEET_ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Relaunches allowed per task after it fails, is lost or is killed.
    #[arg(long, env = "FLEET_MAX_RETRIES", default_value_t = 0)]
    pub max_retries: u32,

    /// Refusal window attached to launches and declines.
    #[arg(long, env = "FLEET_REFUSE_SECONDS", default_value_t = 1.0)]
    pub refuse_seconds: f64,

    /// Per-script wall clock limit.
    #[arg(long, env = "FLEET_TASK_TIMEOUT_SECS")]
    pub task_timeout_secs: Option<u64>,

    /// Cap on captured stdout and stderr, per stream.
    #[arg(long, env = "FLEET_MAX_OUTPUT_BYTES", default_value_t = 1024 * 1024)]
    pub max_output_bytes: usize,

    /// Where executors download artifacts. Defaults to `<tmp>/fleet`.
    #[arg(long, env = "FLEET_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Number of local nodes.
    #[arg(long, env = "FLEET_NODES", default_value_t = 1)]
    pub nodes: usize,

    #[arg(long, env = "FLEET_NODE_CPUS", default_value_t = 2.0)]
    pub node_cpus: f64,

    #[arg(long, env = "FLEET_NODE_MEM", default_value_t = 1024.0)]
    pub node_mem: f64,

    /// Rescind offers left unanswered this long.
    #[arg(long, env = "FLEET_OFFER_TIMEOUT_SECS")]
    pub offer_timeout_secs: Option<u64>,

    /// `EnvFilter` directive; `FLEET_LOG` overrides it.
    #[arg(long, env = "FLEET_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// text, json or journald.
    #[arg(long, env = "FLEET_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,
}

impl Cli {
    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig::new(self.log_format, self.log_level.clone())
    }

    pub fn is_local(&self) -> bool {
        self.master_address == LOCAL_MASTER
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    pub fn offer_timeout(&self) -> Option<Duration> {
        self.offer_timeout_secs.map(Duration::from_secs)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("fleet"))
    }

    /// Served directory: explicit, else the directory holding the work queue.
    pub fn artifact_dir(&self) -> PathBuf {
        if let Some(dir) = &self.artifact_dir {
            return dir.clone();
        }
        match self.work_source_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fleetd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_the_classic_framework() {
        let cli = parse(&[]);
        assert!(cli.is_local());
        assert_eq!(cli.address.to_string(), "127.0.0.1");
        assert_eq!(cli.artifact_port, 8000);
        assert_eq!(cli.cpu_per_task, 1.0);
        assert_eq!(cli.mem_per_task, 128.0);
        assert_eq!(cli.work_source_path, PathBuf::from("commands"));
        assert_eq!(cli.max_retries, 0);
        assert_eq!(cli.log_format, LoggerFormat::Text);
        assert_eq!(cli.task_timeout(), None);
        assert_eq!(cli.artifact_dir(), PathBuf::from("."));
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "--master",
            "10.0.0.1:5050",
            "--cpu-per-task",
            "0.5",
            "--commands",
            "/srv/jobs/queue",
            "--task-timeout-secs",
            "30",
            "--log-format",
            "json",
        ]);
        assert!(!cli.is_local());
        assert_eq!(cli.cpu_per_task, 0.5);
        assert_eq!(cli.task_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cli.artifact_dir(), PathBuf::from("/srv/jobs"));
        assert_eq!(cli.log_format, LoggerFormat::Json);
    }

    #[test]
    fn rejects_unknown_log_format() {
        let res = Cli::try_parse_from(["fleetd", "--log-format", "yaml"]);
        assert!(res.is_err());
    }
}
