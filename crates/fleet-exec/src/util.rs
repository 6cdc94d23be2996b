use std::time::Duration;

use tokio::process::Child;

/// Interpreter used to run fetched scripts, plus the arguments placed before the script path.
pub fn default_interpreter() -> (String, Vec<String>) {
    cfg_if::cfg_if! {
        if #[cfg(target_family = "windows")] {
            ("cmd".to_string(), vec!["/C".to_string()])
        } else {
            ("bash".to_string(), Vec::new())
        }
    }
}

/// SIGTERM the script's process group, wait up to `grace` for the script, then SIGKILL the group.
///
/// `group` is the script's pid taken at spawn; the script leads its own process group, so
/// anything it left running in the background is signalled too.
#[cfg(target_family = "unix")]
pub async fn kill_graceful(
    child: &mut Child,
    group: Option<u32>,
    grace: Duration,
) -> std::io::Result<()> {
    let Some(pgid) = group.and_then(|g| libc::pid_t::try_from(g).ok()) else {
        let _ = child.start_kill();
        return child.wait().await.map(drop);
    };
    signal_group(pgid, libc::SIGTERM);
    let _ = tokio::time::timeout(grace, child.wait()).await;
    signal_group(pgid, libc::SIGKILL);
    child.wait().await.map(drop)
}

#[cfg(target_family = "unix")]
fn signal_group(pgid: libc::pid_t, signal: libc::c_int) {
    // SAFETY: plain syscall; a group that is already gone yields ESRCH, which is fine.
    unsafe {
        libc::kill(-pgid, signal);
    }
}

#[cfg(target_family = "windows")]
pub async fn kill_graceful(
    child: &mut Child,
    _group: Option<u32>,
    _grace: Duration,
) -> std::io::Result<()> {
    child.kill().await
}
