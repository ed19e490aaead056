//! Host signals translated into supervisor actions

use anyhow::Result;
use async_channel::Receiver;

/// What a received signal asks the supervisor to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// SIGINT or SIGTERM
    Stop,
    /// SIGHUP
    Restart,
}

/// Start listening for signals on a background thread
#[cfg(unix)]
pub fn listen() -> Result<Receiver<Action>> {
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
    let (tx, rx) = async_channel::unbounded();

    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for signal in signals.forever() {
                let action = match signal {
                    SIGHUP => Action::Restart,
                    _ => Action::Stop,
                };
                tracing::debug!(signal, ?action, "Received signal");
                if tx.send_blocking(action).is_err() {
                    break;
                }
            }
        })?;

    Ok(rx)
}

/// Signals are not forwarded on this platform; the returned stream is
/// already closed and the process runs until it exits by itself.
#[cfg(not(unix))]
pub fn listen() -> Result<Receiver<Action>> {
    let (_, rx) = async_channel::unbounded();
    Ok(rx)
}
