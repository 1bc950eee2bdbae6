//! Process-group cleanup for spawned commands.
//!
//! Every command leads its own process group, so killing the group also takes
//! down pipeline stages and backgrounded grandchildren that `kill_on_drop` on
//! the direct child would leave behind.

use std::io;

/// Kills the process group of a spawned command when asked to, or when dropped.
#[derive(Debug)]
pub(super) struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    pub(super) fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    /// Send SIGKILL to the whole group. Idempotent; a group that is already
    /// gone is not an error.
    pub(super) fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take()
            && let Err(e) = kill_process_group(pgid)
        {
            tracing::warn!(pgid, "Failed to kill process group: {}", e);
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) -> io::Result<()> {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return Ok(());
    };
    if pgid <= 1 {
        return Ok(());
    }
    // SAFETY: killpg has no memory-safety preconditions.
    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) -> io::Result<()> {
    Ok(())
}
