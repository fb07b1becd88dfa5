use std::io;

use tokio::process::Child;

use crate::config::StopSignal;

/// Ask the child to shut down cleanly.
///
/// Returns `Ok(())` without doing anything if the child has already been
/// reaped. On non-unix targets there is no graceful signal, so the child is
/// killed outright.
#[cfg(unix)]
pub(crate) fn deliver(child: &mut Child, signal: StopSignal) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let signal = match signal {
        StopSignal::Interrupt => Signal::SIGINT,
        StopSignal::Terminate => Signal::SIGTERM,
    };
    kill(Pid::from_raw(pid as i32), signal).map_err(io::Error::from)
}

#[cfg(not(unix))]
pub(crate) fn deliver(child: &mut Child, _signal: StopSignal) -> io::Result<()> {
    child.start_kill()
}
