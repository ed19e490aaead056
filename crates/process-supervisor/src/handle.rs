//! Starting a supervised process and talking to it

use async_channel::{Receiver, Sender};
use futures::channel::oneshot;
use std::fmt;
use std::future::Future;

use crate::actor::{Control, Supervisor};
use crate::options::Options;
use crate::state::{self, ProcessState, StateReader};
use crate::status::{STATUS_CAPACITY, Status, StatusBroadcast};

/// Launch a process and supervise it until it stops.
///
/// Returns once the first launch has either produced a running child or
/// failed; the handle's status is then `Running` or `Stopped`.
pub async fn run(options: Options) -> Handle {
    run_until(options, futures_lite::future::pending()).await
}

/// Like [`run`], but the process is terminated once `shutdown` resolves.
///
/// A shutdown behaves like an external kill: the exit is recorded and the
/// handle reaches `Stopped` without an error.
pub async fn run_until<F>(options: Options, shutdown: F) -> Handle
where
    F: Future<Output = ()> + Send + 'static,
{
    let (control_tx, control_rx) = async_channel::unbounded();
    let (done_tx, done_rx) = async_channel::bounded(1);
    let status = StatusBroadcast::new(STATUS_CAPACITY);
    let changes = status.subscribe();
    let (writer, reader) = state::shared();
    let (started_tx, started_rx) = oneshot::channel();

    let supervisor = Supervisor::new(
        options,
        writer,
        status,
        control_rx,
        Box::pin(shutdown),
        done_tx,
    );
    smol::spawn(supervisor.run(started_tx)).detach();
    let _ = started_rx.await;

    Handle {
        state: reader,
        control: control_tx,
        changes,
        done: done_rx,
    }
}

/// Cloneable handle to a supervised process
#[derive(Clone)]
pub struct Handle {
    state: StateReader,
    control: Sender<Control>,
    changes: Receiver<Status>,
    done: Receiver<()>,
}

impl Handle {
    /// Snapshot of the current state
    pub fn state(&self) -> ProcessState {
        self.state.snapshot()
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.state.read(|s| s.status)
    }

    /// Pid of the current instance
    pub fn pid(&self) -> Option<u32> {
        self.state.read(|s| s.pid)
    }

    /// Stream of status changes.
    ///
    /// Holds the last few changes; when nobody reads, the oldest are dropped.
    /// The stream ends after `Stopped`. Receivers share one queue, so each
    /// change goes to a single receiver.
    pub fn changes(&self) -> Receiver<Status> {
        self.changes.clone()
    }

    /// Replace the running process with a fresh instance.
    ///
    /// Returns when the new instance has started or failed to start. Does
    /// nothing unless the process is running.
    pub async fn restart(&self) {
        let Some(launch) = self.running_launch() else {
            return;
        };
        let (reply, replied) = oneshot::channel();
        if self.control.send(Control::Restart { launch, reply }).await.is_ok() {
            let _ = replied.await;
        }
    }

    /// Ask the running process to terminate. Does not wait for it; does
    /// nothing unless the process is running.
    pub fn stop(&self) {
        if let Some(launch) = self.running_launch() {
            let _ = self.control.try_send(Control::Stop { launch });
        }
    }

    /// Wait until the process has stopped for good
    pub async fn wait(&self) {
        while self.done.recv().await.is_ok() {}
    }

    /// Whether the process has stopped for good
    pub fn is_finished(&self) -> bool {
        self.done.is_closed()
    }

    fn running_launch(&self) -> Option<u64> {
        self.state
            .read(|s| (s.status == Status::Running).then_some(s.launches))
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Handle")
            .field("status", &state.status)
            .field("pid", &state.pid)
            .field("command", &state.command)
            .finish()
    }
}
