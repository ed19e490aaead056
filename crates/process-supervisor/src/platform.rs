//! Per-OS process isolation and termination
//!
//! On POSIX the child leads its own process group and termination sends
//! SIGTERM to the whole group, so grandchildren holding the output pipes
//! open are signalled too. Windows has no process groups in that sense: the
//! child only gets no console window and termination kills the child alone.
//! Descendants it spawned may outlive it there.

use async_process::Child;

use crate::error::{Error, Result};

/// Detach the command from the supervisor's process group / console
#[cfg(unix)]
pub(crate) fn isolate(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

/// Detach the command from the supervisor's process group / console
#[cfg(windows)]
pub(crate) fn isolate(cmd: &mut std::process::Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

/// Detach the command from the supervisor's process group / console
#[cfg(not(any(unix, windows)))]
pub(crate) fn isolate(_cmd: &mut std::process::Command) {}

/// Send SIGTERM to the child's process group
#[cfg(unix)]
pub(crate) fn terminate(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    match signal::killpg(pgid, Signal::SIGTERM) {
        // Already gone
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(Error::signal_failed(Signal::SIGTERM as i32, e.to_string())),
    }
}

/// Kill the child process itself (descendants are not reached)
#[cfg(not(unix))]
pub(crate) fn terminate(child: &mut Child) -> Result<()> {
    match child.kill() {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(Error::signal_failed(-1, e.to_string())),
    }
}
