//! POSIX rlimits for task scripts.
//!
//! Limits are installed with a `pre_exec` hook, so they take effect in the child after
//! `fork()` and before the interpreter is exec'd. On non-Unix targets a non-empty config
//! is logged and ignored.
use tokio::process::Command;
#[cfg(not(unix))]
use tracing::warn;

/// Per-script resource caps. `None` keeps the inherited limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RlimitConfig {
    /// `RLIMIT_NOFILE`.
    pub max_open_files: Option<u64>,
    /// `RLIMIT_FSIZE`; writing past it raises `SIGXFSZ` in the script.
    pub max_file_size_bytes: Option<u64>,
    /// `RLIMIT_CPU`, in seconds of CPU time.
    pub max_cpu_seconds: Option<u64>,
    /// `RLIMIT_CORE = 0`.
    pub disable_core_dumps: bool,
}

impl RlimitConfig {
    pub fn is_empty(&self) -> bool {
        self.max_open_files.is_none()
            && self.max_file_size_bytes.is_none()
            && self.max_cpu_seconds.is_none()
            && !self.disable_core_dumps
    }
}

pub fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
    if config.is_empty() {
        return;
    }

    #[cfg(unix)]
    unix_impl::attach(cmd, config.clone());

    #[cfg(not(unix))]
    {
        let _ = cmd;
        warn!(target: "fleet.exec.limits", ?config, "rlimits are not supported on this platform; ignoring");
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::io;

    use tokio::process::Command;

    use super::RlimitConfig;

    macro_rules! set {
        ($resource:expr, $value:expr) => {{
            let rlim = libc::rlimit {
                rlim_cur: $value as libc::rlim_t,
                rlim_max: $value as libc::rlim_t,
            };
            if unsafe { libc::setrlimit($resource, &rlim) } != 0 {
                return Err(io::Error::last_os_error());
            }
        }};
    }

    pub fn attach(cmd: &mut Command, config: RlimitConfig) {
        let hook = move || -> io::Result<()> {
            if let Some(n) = config.max_open_files {
                set!(libc::RLIMIT_NOFILE, n);
            }
            if let Some(n) = config.max_file_size_bytes {
                set!(libc::RLIMIT_FSIZE, n);
            }
            if let Some(n) = config.max_cpu_seconds {
                set!(libc::RLIMIT_CPU, n);
            }
            if config.disable_core_dumps {
                set!(libc::RLIMIT_CORE, 0u64);
            }
            Ok(())
        };
        // SAFETY: the hook only calls async-signal-safe `setrlimit` and allocates nothing.
        unsafe {
            cmd.pre_exec(hook);
        }
    }
}
